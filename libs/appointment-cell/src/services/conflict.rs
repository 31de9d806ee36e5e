// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::DomainError;
use shared_store::Table;
use slot_cell::models::{SlotAvailability, TimeSlot};

use crate::models::Appointment;

/// Availability and conflict checks.
///
/// Two modes, kept independent on purpose: slot-backed requests are judged
/// by slot capacity, ad-hoc requests by a raw interval scan over the
/// doctor's live appointments. An ad-hoc appointment never decrements slot
/// capacity even when it coincides with a slot's window.
pub struct ConflictDetectionService {
    slots: Arc<Table<TimeSlot>>,
    appointments: Arc<Table<Appointment>>,
}

impl ConflictDetectionService {
    pub fn new(slots: Arc<Table<TimeSlot>>, appointments: Arc<Table<Appointment>>) -> Self {
        Self {
            slots,
            appointments,
        }
    }

    /// Slots able to host the requested interval, with remaining capacity.
    /// Doctors' calendars are independent; a viable slot must cover the
    /// whole `[start, start + duration)` interval on one calendar day.
    pub async fn check_availability(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<Vec<SlotAvailability>, DomainError> {
        if duration_minutes <= 0 {
            return Err(DomainError::validation(
                "requested duration must be positive",
            ));
        }

        let end = start + Duration::minutes(duration_minutes as i64);
        if end.date_naive() != start.date_naive() {
            // No slot spans midnight, so nothing can cover this interval.
            return Ok(Vec::new());
        }

        let date = start.date_naive();
        let request_start = start.time();
        let request_end = end.time();

        let mut viable: Vec<SlotAvailability> = self
            .slots
            .filter(|slot| {
                slot.doctor_id == doctor_id
                    && slot.slot_date == date
                    && slot.is_available
                    && slot.occupancy < slot.capacity
                    && slot.covers(request_start, request_end)
            })?
            .iter()
            .map(SlotAvailability::from)
            .collect();
        viable.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        debug!(
            "Found {} viable slot(s) for doctor {} at {}",
            viable.len(),
            doctor_id,
            start
        );
        Ok(viable)
    }

    /// Interval-overlap scan for slot-less bookings: an ad-hoc appointment
    /// may never overlap a live appointment of the same doctor.
    pub async fn ensure_no_adhoc_conflict(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), DomainError> {
        let clashing = self.appointments.filter(|appointment| {
            appointment.doctor_id == doctor_id
                && appointment.is_live()
                && exclude_appointment_id != Some(appointment.id)
                && intervals_overlap(
                    start,
                    end,
                    appointment.appointment_date,
                    appointment.scheduled_end_time(),
                )
        })?;

        if !clashing.is_empty() {
            warn!(
                "Ad-hoc conflict for doctor {}: {} live appointment(s) overlap {}",
                doctor_id,
                clashing.len(),
                start
            );
            return Err(DomainError::SchedulingConflict(format!(
                "doctor {} already has {} live appointment(s) overlapping the requested time",
                doctor_id,
                clashing.len()
            )));
        }
        Ok(())
    }
}

/// Two intervals overlap when each starts before the other ends.
fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::TimeZone;

    fn instant(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 14, hour, minute, 0).unwrap()
    }

    fn live_appointment(doctor_id: Uuid, start: DateTime<Utc>, duration: i32) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id,
            slot_id: None,
            appointment_date: start,
            duration_minutes: duration,
            status: AppointmentStatus::Confirmed,
            consultation_fee: None,
            is_paid: false,
            cancellation_reason: None,
            rescheduled_from: None,
            patient_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn service_with_appointment(
        appointment: &Appointment,
    ) -> ConflictDetectionService {
        let appointments = Arc::new(Table::new("appointment"));
        appointments
            .insert(appointment.id, appointment.clone())
            .unwrap();
        ConflictDetectionService::new(Arc::new(Table::new("time_slot")), appointments)
    }

    #[test]
    fn interval_overlap_is_half_open() {
        // Back-to-back intervals do not overlap.
        assert!(!intervals_overlap(
            instant(9, 0),
            instant(9, 30),
            instant(9, 30),
            instant(10, 0)
        ));
        assert!(intervals_overlap(
            instant(9, 0),
            instant(9, 31),
            instant(9, 30),
            instant(10, 0)
        ));
    }

    #[tokio::test]
    async fn adhoc_overlap_with_live_appointment_is_a_conflict() {
        let doctor = Uuid::new_v4();
        let existing = live_appointment(doctor, instant(10, 0), 30);
        let service = service_with_appointment(&existing);

        let result = service
            .ensure_no_adhoc_conflict(doctor, instant(10, 15), instant(10, 45), None)
            .await;
        assert!(matches!(result, Err(DomainError::SchedulingConflict(_))));

        // Another doctor at the same instant is fine.
        let other = Uuid::new_v4();
        assert!(service
            .ensure_no_adhoc_conflict(other, instant(10, 15), instant(10, 45), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn cancelled_appointments_do_not_block_adhoc_bookings() {
        let doctor = Uuid::new_v4();
        let mut existing = live_appointment(doctor, instant(10, 0), 30);
        existing.status = AppointmentStatus::Cancelled;
        let service = service_with_appointment(&existing);

        assert!(service
            .ensure_no_adhoc_conflict(doctor, instant(10, 0), instant(10, 30), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn excluded_appointment_is_ignored_in_the_scan() {
        let doctor = Uuid::new_v4();
        let existing = live_appointment(doctor, instant(10, 0), 30);
        let service = service_with_appointment(&existing);

        assert!(service
            .ensure_no_adhoc_conflict(
                doctor,
                instant(10, 0),
                instant(10, 30),
                Some(existing.id)
            )
            .await
            .is_ok());
    }
}
