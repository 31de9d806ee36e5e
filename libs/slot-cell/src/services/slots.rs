// libs/slot-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::DomainError;
use shared_store::Table;

use crate::models::{CreateSlotRequest, TimeSlot};

/// Owns TimeSlot rows and the atomic capacity accounting on them.
///
/// Reserve and release are single check-and-mutate units under the slot
/// table's write lock: two concurrent requests for the last unit of capacity
/// produce exactly one success and one `CapacityExhausted`.
pub struct SlotService {
    slots: Arc<Table<TimeSlot>>,
}

impl SlotService {
    pub fn new(slots: Arc<Table<TimeSlot>>) -> Self {
        Self { slots }
    }

    /// Create a single slot after validating its window against every other
    /// slot the doctor already has on that date.
    pub async fn create_slot(&self, request: CreateSlotRequest) -> Result<TimeSlot, DomainError> {
        debug!(
            "Creating slot for doctor {} on {} {}-{}",
            request.doctor_id, request.slot_date, request.start_time, request.end_time
        );

        validate_window(request.start_time, request.end_time, request.capacity)?;

        let now = Utc::now();
        let slot = TimeSlot {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            slot_date: request.slot_date,
            start_time: request.start_time,
            end_time: request.end_time,
            capacity: request.capacity,
            occupancy: 0,
            is_booked: false,
            is_available: true,
            recurrence_id: None,
            created_at: now,
            updated_at: now,
        };

        let siblings = self.slots.filter(|existing| existing.overlaps(&slot))?;
        if !siblings.is_empty() {
            warn!(
                "Slot creation rejected for doctor {}: overlaps {} existing slot(s) on {}",
                request.doctor_id,
                siblings.len(),
                request.slot_date
            );
            return Err(DomainError::SchedulingConflict(format!(
                "doctor {} already has a slot overlapping {}-{} on {}",
                request.doctor_id, request.start_time, request.end_time, request.slot_date
            )));
        }

        self.slots.insert(slot.id, slot.clone())?;
        info!("Slot {} created for doctor {}", slot.id, slot.doctor_id);
        Ok(slot)
    }

    /// Atomically claim one unit of capacity. The occupancy check and the
    /// increment happen in one unit under the table write lock.
    pub async fn reserve(&self, slot_id: Uuid) -> Result<TimeSlot, DomainError> {
        let reserved = self.slots.try_update(slot_id, |slot| {
            if !slot.is_available {
                return Err(DomainError::validation(format!(
                    "slot {} is no longer offered",
                    slot.id
                )));
            }
            if slot.occupancy >= slot.capacity {
                return Err(DomainError::CapacityExhausted);
            }
            slot.occupancy += 1;
            slot.recompute_booked();
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })?;

        debug!(
            "Slot {} reserved, occupancy {}/{}",
            slot_id, reserved.occupancy, reserved.capacity
        );
        Ok(reserved)
    }

    /// Atomically give back one unit of capacity. Releasing a slot that has
    /// no occupancy signals a bookkeeping bug elsewhere and is rejected
    /// rather than clamped.
    pub async fn release(&self, slot_id: Uuid) -> Result<TimeSlot, DomainError> {
        let released = self.slots.try_update(slot_id, |slot| {
            if slot.occupancy == 0 {
                return Err(DomainError::validation(format!(
                    "release on slot {} would take occupancy below zero",
                    slot.id
                )));
            }
            slot.occupancy -= 1;
            slot.recompute_booked();
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })?;

        debug!(
            "Slot {} released, occupancy {}/{}",
            slot_id, released.occupancy, released.capacity
        );
        Ok(released)
    }

    /// Slots referenced by appointments are never deleted; retiring marks
    /// them unavailable for new reservations instead.
    pub async fn retire(&self, slot_id: Uuid) -> Result<TimeSlot, DomainError> {
        let retired = self.slots.try_update(slot_id, |slot| {
            slot.is_available = false;
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })?;
        info!("Slot {} retired", slot_id);
        Ok(retired)
    }

    pub async fn get_slot(&self, slot_id: Uuid) -> Result<TimeSlot, DomainError> {
        self.slots.require(slot_id)
    }

    pub async fn slots_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<TimeSlot>, DomainError> {
        let mut slots = self.slots.filter(|slot| slot.doctor_id == doctor_id)?;
        slots.sort_by(|a, b| {
            a.slot_date
                .cmp(&b.slot_date)
                .then(a.start_time.cmp(&b.start_time))
        });
        Ok(slots)
    }

    pub async fn slots_for_doctor_on(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, DomainError> {
        let mut slots = self
            .slots
            .filter(|slot| slot.doctor_id == doctor_id && slot.slot_date == date)?;
        slots.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(slots)
    }
}

pub(crate) fn validate_window(
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
    capacity: u32,
) -> Result<(), DomainError> {
    if start >= end {
        return Err(DomainError::validation(
            "slot start time must be before end time",
        ));
    }
    if capacity == 0 {
        return Err(DomainError::validation("slot capacity must be at least 1"));
    }
    Ok(())
}
