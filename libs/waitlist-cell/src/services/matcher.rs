// libs/waitlist-cell/src/services/matcher.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::{
    DomainError, NotificationChannel, NotificationDispatcher, NotificationPayload,
};
use shared_store::Table;
use slot_cell::models::TimeSlot;

use crate::models::{AddWaitingListRequest, WaitingListEntry, HIGHEST_PRIORITY, LOWEST_PRIORITY};

/// Matches freed capacity against the waiting list.
///
/// The matcher only emits notification intents; it never books. Selection is
/// priority ascending, then entry age ascending, at most one entry per freed
/// unit of capacity. The notified flag is flipped under the entry table's
/// write lock, so a racing sweep can never pick the same entry twice.
pub struct WaitingListMatcherService {
    entries: Arc<Table<WaitingListEntry>>,
    slots: Arc<Table<TimeSlot>>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl WaitingListMatcherService {
    pub fn new(
        entries: Arc<Table<WaitingListEntry>>,
        slots: Arc<Table<TimeSlot>>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            entries,
            slots,
            dispatcher,
        }
    }

    pub async fn add_entry(
        &self,
        request: AddWaitingListRequest,
    ) -> Result<WaitingListEntry, DomainError> {
        if request.priority < HIGHEST_PRIORITY || request.priority > LOWEST_PRIORITY {
            return Err(DomainError::Validation(format!(
                "waiting list priority must be between {} and {}",
                HIGHEST_PRIORITY, LOWEST_PRIORITY
            )));
        }
        if request.preferred_start >= request.preferred_end {
            return Err(DomainError::validation(
                "preferred start time must be before preferred end time",
            ));
        }

        let entry = WaitingListEntry {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            preferred_date: request.preferred_date,
            preferred_start: request.preferred_start,
            preferred_end: request.preferred_end,
            priority: request.priority,
            is_active: true,
            notified: false,
            created_at: Utc::now(),
        };
        self.entries.insert(entry.id, entry.clone())?;

        debug!(
            "Waiting list entry {} added for patient {} with doctor {} (priority {})",
            entry.id, entry.patient_id, entry.doctor_id, entry.priority
        );
        Ok(entry)
    }

    /// Called after capacity has been released on a slot. `freed_units` is
    /// the number of units this release opened (one per cancellation).
    pub async fn attempt_fill(
        &self,
        slot: &TimeSlot,
        freed_units: u32,
    ) -> Result<Vec<WaitingListEntry>, DomainError> {
        self.fill_window(
            slot.doctor_id,
            slot.slot_date,
            slot.start_time,
            slot.end_time,
            freed_units,
        )
        .await
    }

    /// Sweep all of a doctor's open capacity on a date and notify matching
    /// entries. Exposed for the surrounding transport layer.
    pub async fn notify_matches(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<WaitingListEntry>, DomainError> {
        let open_slots = self.slots.filter(|slot| {
            slot.doctor_id == doctor_id
                && slot.slot_date == date
                && slot.is_available
                && slot.occupancy < slot.capacity
        })?;

        let mut notified = Vec::new();
        for slot in open_slots {
            notified.extend(
                self.fill_window(
                    doctor_id,
                    date,
                    slot.start_time,
                    slot.end_time,
                    slot.remaining_capacity(),
                )
                .await?,
            );
        }
        Ok(notified)
    }

    pub async fn deactivate(&self, entry_id: Uuid) -> Result<WaitingListEntry, DomainError> {
        self.entries.try_update(entry_id, |entry| {
            entry.is_active = false;
            Ok(entry.clone())
        })
    }

    /// Puts an entry back into matching, clearing the notified flag.
    pub async fn reactivate(&self, entry_id: Uuid) -> Result<WaitingListEntry, DomainError> {
        self.entries.try_update(entry_id, |entry| {
            entry.is_active = true;
            entry.notified = false;
            Ok(entry.clone())
        })
    }

    pub async fn entries_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<WaitingListEntry>, DomainError> {
        let mut entries = self.entries.filter(|entry| entry.doctor_id == doctor_id)?;
        entries.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(entries)
    }

    async fn fill_window(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        window_start: NaiveTime,
        window_end: NaiveTime,
        units: u32,
    ) -> Result<Vec<WaitingListEntry>, DomainError> {
        if units == 0 {
            return Ok(Vec::new());
        }

        let mut candidates = self.entries.filter(|entry| {
            entry.is_active
                && !entry.notified
                && entry.doctor_id == doctor_id
                && entry.preferred_date == date
                && entry.wants_window(window_start, window_end)
        })?;
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        let mut notified = Vec::new();
        for candidate in candidates {
            if notified.len() >= units as usize {
                break;
            }

            // Claim under the write lock; a concurrent sweep may have won.
            let claimed = self.entries.try_update(candidate.id, |entry| {
                if !entry.is_active || entry.notified {
                    return Ok(None);
                }
                entry.notified = true;
                Ok(Some(entry.clone()))
            })?;
            let Some(entry) = claimed else {
                continue;
            };

            self.emit_intent(&entry, date, window_start, window_end).await;
            notified.push(entry);
        }

        if !notified.is_empty() {
            info!(
                "Notified {} waiting list entr{} for doctor {} on {}",
                notified.len(),
                if notified.len() == 1 { "y" } else { "ies" },
                doctor_id,
                date
            );
        }
        Ok(notified)
    }

    /// Delivery failures are the dispatcher's problem to retry; the entry
    /// stays claimed either way so it cannot be double-notified.
    async fn emit_intent(
        &self,
        entry: &WaitingListEntry,
        date: NaiveDate,
        window_start: NaiveTime,
        window_end: NaiveTime,
    ) {
        let payload = NotificationPayload {
            subject: "An appointment time has opened up".to_string(),
            body: format!(
                "Capacity is now available on {} between {} and {}. Book now to claim it.",
                date, window_start, window_end
            ),
            reference_id: entry.id,
        };

        if let Err(err) = self
            .dispatcher
            .send(NotificationChannel::Email, entry.patient_id, payload)
            .await
        {
            warn!(
                "Waiting list notification for entry {} failed: {}",
                entry.id, err
            );
        }
    }
}
