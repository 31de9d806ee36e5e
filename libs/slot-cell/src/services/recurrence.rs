// libs/slot-cell/src/services/recurrence.rs
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::DomainError;
use shared_store::Table;

use crate::models::{
    BulkSlotOutcome, BulkSlotRequest, SlotTemplate, SlotValidationFailure, TimeSlot,
};
use crate::services::slots::validate_window;

/// Expands a recurring-slot template into concrete dated slots.
///
/// Re-running the same request is idempotent: a slot that already exists for
/// the doctor at the same date and start time is skipped, never duplicated.
/// Candidates that fail their own validation are collected and reported
/// without aborting the rest of the batch.
pub struct RecurrenceService {
    slots: Arc<Table<TimeSlot>>,
}

impl RecurrenceService {
    pub fn new(slots: Arc<Table<TimeSlot>>) -> Self {
        Self { slots }
    }

    pub async fn bulk_create(&self, request: BulkSlotRequest) -> Result<BulkSlotOutcome, DomainError> {
        debug!(
            "Bulk slot generation for doctor {} from {} to {}",
            request.doctor_id, request.start_date, request.end_date
        );

        if request.start_date > request.end_date {
            return Err(DomainError::validation(
                "recurrence start date must not be after end date",
            ));
        }
        if request.templates.is_empty() {
            return Err(DomainError::validation(
                "recurrence request carries no slot templates",
            ));
        }
        if let Some(invalid) = request.weekdays.iter().find(|day| **day > 6) {
            return Err(DomainError::Validation(format!(
                "weekday {} is out of range (0 = Sunday .. 6 = Saturday)",
                invalid
            )));
        }

        let recurrence_id = Uuid::new_v4();
        let mut outcome = BulkSlotOutcome {
            created: Vec::new(),
            skipped_existing: 0,
            failures: Vec::new(),
        };

        let mut date = request.start_date;
        while date <= request.end_date {
            let weekday = date.weekday().num_days_from_sunday() as u8;
            if request.weekdays.contains(&weekday) {
                for template in &request.templates {
                    self.generate_for_window(&request, template, date, recurrence_id, &mut outcome)?;
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        info!(
            "Bulk generation for doctor {} created {} slot(s), skipped {} existing, {} failure(s)",
            request.doctor_id,
            outcome.created.len(),
            outcome.skipped_existing,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    fn generate_for_window(
        &self,
        request: &BulkSlotRequest,
        template: &SlotTemplate,
        date: chrono::NaiveDate,
        recurrence_id: Uuid,
        outcome: &mut BulkSlotOutcome,
    ) -> Result<(), DomainError> {
        for (start, end) in expand_template(template, request.slot_duration_minutes, request.break_minutes) {
            if let Err(err) = validate_window(start, end, template.capacity) {
                outcome.failures.push(SlotValidationFailure {
                    slot_date: date,
                    start_time: start,
                    end_time: end,
                    reason: err.to_string(),
                });
                continue;
            }

            let already_exists = !self
                .slots
                .filter(|slot| {
                    slot.doctor_id == request.doctor_id
                        && slot.slot_date == date
                        && slot.start_time == start
                })?
                .is_empty();
            if already_exists {
                outcome.skipped_existing += 1;
                continue;
            }

            let now = Utc::now();
            let candidate = TimeSlot {
                id: Uuid::new_v4(),
                doctor_id: request.doctor_id,
                slot_date: date,
                start_time: start,
                end_time: end,
                capacity: template.capacity,
                occupancy: 0,
                is_booked: false,
                is_available: true,
                recurrence_id: Some(recurrence_id),
                created_at: now,
                updated_at: now,
            };

            let clashing = self.slots.filter(|slot| slot.overlaps(&candidate))?;
            if !clashing.is_empty() {
                warn!(
                    "Generated slot {}-{} on {} overlaps existing availability, reporting as failure",
                    start, end, date
                );
                outcome.failures.push(SlotValidationFailure {
                    slot_date: date,
                    start_time: start,
                    end_time: end,
                    reason: "overlaps an existing slot at a different start time".to_string(),
                });
                continue;
            }

            self.slots.insert(candidate.id, candidate.clone())?;
            outcome.created.push(candidate);
        }
        Ok(())
    }
}

/// Cut a template window into concrete (start, end) pairs. Without a slot
/// duration the window itself is the slot; with one, slots of that length
/// are laid out separated by the break, stopping at the window end. Windows
/// never wrap past midnight.
fn expand_template(
    template: &SlotTemplate,
    slot_duration_minutes: Option<u32>,
    break_minutes: u32,
) -> Vec<(NaiveTime, NaiveTime)> {
    let duration = match slot_duration_minutes {
        None | Some(0) => return vec![(template.start_time, template.end_time)],
        Some(minutes) => Duration::minutes(minutes as i64),
    };
    let step = duration + Duration::minutes(break_minutes as i64);

    let mut windows = Vec::new();
    let mut cursor = template.start_time;
    loop {
        let (slot_end, end_wrapped) = cursor.overflowing_add_signed(duration);
        if end_wrapped != 0 || slot_end > template.end_time {
            break;
        }
        windows.push((cursor, slot_end));

        let (next, step_wrapped) = cursor.overflowing_add_signed(step);
        if step_wrapped != 0 || next <= cursor {
            break;
        }
        cursor = next;
    }
    windows
}
