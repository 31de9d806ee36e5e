// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::DomainError;
use shared_store::Table;
use slot_cell::models::{SlotAvailability, TimeSlot};
use slot_cell::services::SlotService;

use reminder_cell::services::ReminderSchedulerService;
use waitlist_cell::services::WaitingListMatcherService;

use crate::models::{
    Appointment, AppointmentLog, AppointmentSearchQuery, AppointmentStats, AppointmentStatus,
    AppointmentValidationRules, AuditAction, BookAppointmentRequest, CancelAppointmentRequest,
    RescheduleAppointmentRequest,
};
use crate::services::audit::AuditTrailService;
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

/// The booking orchestrator: one explicit service object constructed per
/// process and handed by reference to the transport layer.
///
/// Capacity is always claimed before anything else is written, so a failed
/// booking or reschedule never leaves the prior state disturbed; every
/// committed mutation carries exactly one audit entry, and reminder /
/// waiting-list side effects run only after the mutation is committed.
pub struct AppointmentBookingService {
    appointments: Arc<Table<Appointment>>,
    slot_service: SlotService,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    audit_service: AuditTrailService,
    reminder_service: Arc<ReminderSchedulerService>,
    waitlist_service: Arc<WaitingListMatcherService>,
    validation_rules: AppointmentValidationRules,
}

impl AppointmentBookingService {
    pub fn new(
        appointments: Arc<Table<Appointment>>,
        logs: Arc<Table<AppointmentLog>>,
        slots: Arc<Table<TimeSlot>>,
        reminder_service: Arc<ReminderSchedulerService>,
        waitlist_service: Arc<WaitingListMatcherService>,
    ) -> Self {
        Self {
            slot_service: SlotService::new(Arc::clone(&slots)),
            conflict_service: ConflictDetectionService::new(slots, Arc::clone(&appointments)),
            lifecycle_service: AppointmentLifecycleService::new(),
            audit_service: AuditTrailService::new(logs),
            appointments,
            reminder_service,
            waitlist_service,
            validation_rules: AppointmentValidationRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: AppointmentValidationRules) -> Self {
        self.validation_rules = rules;
        self
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        actor_id: Uuid,
    ) -> Result<Appointment, DomainError> {
        info!(
            "Booking appointment for patient {} with doctor {} at {}",
            request.patient_id, request.doctor_id, request.start_time
        );

        self.validate_schedule(request.start_time, request.duration_minutes)?;
        let end_time =
            request.start_time + ChronoDuration::minutes(request.duration_minutes as i64);

        // Claim capacity first. Slot-backed bookings go through the atomic
        // reserve; ad-hoc bookings are judged against raw intervals instead.
        let reserved_slot = match request.slot_id {
            Some(slot_id) => {
                let slot = self.slot_service.get_slot(slot_id).await?;
                self.ensure_slot_hosts(&slot, request.doctor_id, request.start_time, end_time)?;
                Some(self.slot_service.reserve(slot_id).await?)
            }
            None => {
                self.conflict_service
                    .ensure_no_adhoc_conflict(request.doctor_id, request.start_time, end_time, None)
                    .await?;
                None
            }
        };

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            slot_id: reserved_slot.as_ref().map(|slot| slot.id),
            appointment_date: request.start_time,
            duration_minutes: request.duration_minutes,
            status: if request.auto_confirm {
                AppointmentStatus::Confirmed
            } else {
                AppointmentStatus::Pending
            },
            consultation_fee: request.consultation_fee,
            is_paid: false,
            cancellation_reason: None,
            rescheduled_from: None,
            patient_notes: request.patient_notes.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.persist_created(&appointment, actor_id).await {
            if let Some(slot) = &reserved_slot {
                self.rollback_reservation(slot.id).await;
            }
            return Err(err);
        }

        self.reminder_service
            .schedule_for_appointment(
                appointment.id,
                appointment.patient_id,
                appointment.appointment_date,
            )
            .await?;

        info!(
            "Appointment {} booked in status {}",
            appointment.id, appointment.status
        );
        Ok(appointment)
    }

    // ==========================================================================
    // LIFECYCLE TRANSITIONS
    // ==========================================================================

    pub async fn confirm(
        &self,
        appointment_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Appointment, DomainError> {
        let (_, confirmed) = self
            .apply_transition(
                appointment_id,
                AppointmentStatus::Confirmed,
                AuditAction::Confirmed,
                actor_id,
                None,
                |_| {},
            )
            .await?;
        info!("Appointment {} confirmed", appointment_id);
        Ok(confirmed)
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        actor_id: Uuid,
    ) -> Result<Appointment, DomainError> {
        debug!("Cancelling appointment {}", appointment_id);

        let note = format!("Cancelled by {:?}: {}", request.cancelled_by, request.reason);
        let reason = request.reason.clone();
        let (_, cancelled) = self
            .apply_transition(
                appointment_id,
                AppointmentStatus::Cancelled,
                AuditAction::Cancelled,
                actor_id,
                Some(note),
                |appointment| {
                    appointment.cancellation_reason = Some(reason);
                },
            )
            .await?;

        self.reminder_service.cancel_pending(appointment_id).await?;
        self.release_and_refill(&cancelled).await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    /// Logically a cancel-then-book pair executed as one operation. The new
    /// capacity is reserved before the original appointment is touched, so a
    /// failed new booking leaves the original confirmed/pending with its
    /// slot occupancy unchanged.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        actor_id: Uuid,
    ) -> Result<Appointment, DomainError> {
        debug!("Rescheduling appointment {}", appointment_id);

        let original = self.appointments.require(appointment_id)?;
        self.lifecycle_service
            .validate_transition(&original.status, &AppointmentStatus::Rescheduled)?;

        let duration = request
            .new_duration_minutes
            .unwrap_or(original.duration_minutes);
        self.validate_schedule(request.new_start_time, duration)?;
        let new_end = request.new_start_time + ChronoDuration::minutes(duration as i64);

        let new_slot = match request.new_slot_id {
            Some(slot_id) => {
                let slot = self.slot_service.get_slot(slot_id).await?;
                self.ensure_slot_hosts(&slot, original.doctor_id, request.new_start_time, new_end)?;
                Some(self.slot_service.reserve(slot_id).await?)
            }
            None => {
                self.conflict_service
                    .ensure_no_adhoc_conflict(
                        original.doctor_id,
                        request.new_start_time,
                        new_end,
                        Some(original.id),
                    )
                    .await?;
                None
            }
        };

        // Retire the original together with its audit entry.
        let (before, retired) = match self
            .apply_transition(
                appointment_id,
                AppointmentStatus::Rescheduled,
                AuditAction::Rescheduled,
                actor_id,
                request.reason.clone(),
                |_| {},
            )
            .await
        {
            Ok(pair) => pair,
            Err(err) => {
                if let Some(slot) = &new_slot {
                    self.rollback_reservation(slot.id).await;
                }
                return Err(err);
            }
        };

        // Free the original's capacity now that it is terminal.
        let mut freed_slot = None;
        if let Some(slot_id) = retired.slot_id {
            freed_slot = Some(self.slot_service.release(slot_id).await?);
        }

        let now = Utc::now();
        let successor = Appointment {
            id: Uuid::new_v4(),
            patient_id: original.patient_id,
            doctor_id: original.doctor_id,
            slot_id: new_slot.as_ref().map(|slot| slot.id),
            appointment_date: request.new_start_time,
            duration_minutes: duration,
            // The successor resumes where the original stood.
            status: before.status.clone(),
            consultation_fee: original.consultation_fee,
            is_paid: original.is_paid,
            cancellation_reason: None,
            rescheduled_from: Some(original.id),
            patient_notes: original.patient_notes.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.persist_created(&successor, actor_id).await {
            // Storage is failing; unwind what we can before surfacing it.
            if let Some(slot) = &new_slot {
                self.rollback_reservation(slot.id).await;
            }
            if let Some(slot_id) = retired.slot_id {
                if let Err(reserve_err) = self.slot_service.reserve(slot_id).await {
                    warn!(
                        "Failed to re-reserve slot {} while unwinding reschedule: {}",
                        slot_id, reserve_err
                    );
                }
            }
            self.restore_appointment(&before).await;
            return Err(err);
        }

        self.reminder_service.cancel_pending(original.id).await?;
        self.reminder_service
            .schedule_for_appointment(
                successor.id,
                successor.patient_id,
                successor.appointment_date,
            )
            .await?;
        if let Some(slot) = freed_slot {
            self.waitlist_service.attempt_fill(&slot, 1).await?;
        }

        info!(
            "Appointment {} rescheduled to {} as appointment {}",
            appointment_id, successor.appointment_date, successor.id
        );
        Ok(successor)
    }

    pub async fn complete(
        &self,
        appointment_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Appointment, DomainError> {
        let (_, completed) = self
            .apply_transition(
                appointment_id,
                AppointmentStatus::Completed,
                AuditAction::Completed,
                actor_id,
                None,
                |_| {},
            )
            .await?;
        info!("Appointment {} completed", appointment_id);
        Ok(completed)
    }

    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Appointment, DomainError> {
        let (_, no_show) = self
            .apply_transition(
                appointment_id,
                AppointmentStatus::NoShow,
                AuditAction::NoShow,
                actor_id,
                None,
                |_| {},
            )
            .await?;

        self.release_and_refill(&no_show).await?;

        info!("Appointment {} marked as no-show", appointment_id);
        Ok(no_show)
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn check_availability(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<Vec<SlotAvailability>, DomainError> {
        self.conflict_service
            .check_availability(doctor_id, start, duration_minutes)
            .await
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, DomainError> {
        self.appointments.require(appointment_id)
    }

    pub async fn audit_trail(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<AppointmentLog>, DomainError> {
        self.audit_service.entries_for(appointment_id).await
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, DomainError> {
        let mut matches = self.appointments.filter(|appointment| {
            query
                .patient_id
                .map_or(true, |id| appointment.patient_id == id)
                && query.doctor_id.map_or(true, |id| appointment.doctor_id == id)
                && query
                    .status
                    .as_ref()
                    .map_or(true, |status| appointment.status == *status)
                && query
                    .from_date
                    .map_or(true, |from| appointment.appointment_date >= from)
                && query
                    .to_date
                    .map_or(true, |to| appointment.appointment_date <= to)
        })?;
        matches.sort_by(|a, b| b.appointment_date.cmp(&a.appointment_date));

        let offset = query.offset.unwrap_or(0);
        let matches: Vec<Appointment> = matches
            .into_iter()
            .skip(offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(matches)
    }

    pub async fn appointment_stats(
        &self,
        patient_id: Option<Uuid>,
        doctor_id: Option<Uuid>,
    ) -> Result<AppointmentStats, DomainError> {
        let appointments = self.appointments.filter(|appointment| {
            patient_id.map_or(true, |id| appointment.patient_id == id)
                && doctor_id.map_or(true, |id| appointment.doctor_id == id)
        })?;

        Ok(AppointmentStats {
            total_appointments: appointments.len(),
            completed_appointments: appointments
                .iter()
                .filter(|a| a.status == AppointmentStatus::Completed)
                .count(),
            cancelled_appointments: appointments
                .iter()
                .filter(|a| a.status == AppointmentStatus::Cancelled)
                .count(),
            no_show_appointments: appointments
                .iter()
                .filter(|a| a.status == AppointmentStatus::NoShow)
                .count(),
        })
    }

    // ==========================================================================
    // PRIVATE HELPER METHODS
    // ==========================================================================

    /// Status change and its audit entry succeed or fail together. The
    /// transition is revalidated under the table write lock so a concurrent
    /// transition cannot exit the same state twice.
    async fn apply_transition(
        &self,
        appointment_id: Uuid,
        next_status: AppointmentStatus,
        action: AuditAction,
        actor_id: Uuid,
        notes: Option<String>,
        mutate: impl FnOnce(&mut Appointment),
    ) -> Result<(Appointment, Appointment), DomainError> {
        let before = self.appointments.require(appointment_id)?;
        self.lifecycle_service
            .validate_transition(&before.status, &next_status)?;

        let lifecycle = &self.lifecycle_service;
        let after = self.appointments.try_update(appointment_id, move |appointment| {
            lifecycle.validate_transition(&appointment.status, &next_status)?;
            appointment.status = next_status;
            mutate(appointment);
            appointment.updated_at = Utc::now();
            Ok(appointment.clone())
        })?;

        if let Err(err) = self
            .audit_service
            .record(
                appointment_id,
                action,
                actor_id,
                Some(before.snapshot()),
                after.snapshot(),
                notes,
            )
            .await
        {
            self.restore_appointment(&before).await;
            return Err(err);
        }
        Ok((before, after))
    }

    async fn persist_created(
        &self,
        appointment: &Appointment,
        actor_id: Uuid,
    ) -> Result<(), DomainError> {
        self.appointments
            .insert(appointment.id, appointment.clone())?;
        if let Err(err) = self
            .audit_service
            .record(
                appointment.id,
                AuditAction::Created,
                actor_id,
                None,
                appointment.snapshot(),
                None,
            )
            .await
        {
            if self.appointments.remove(appointment.id).is_err() {
                warn!(
                    "Failed to roll back appointment {} after audit failure",
                    appointment.id
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Free one unit of the appointment's slot capacity, then offer the
    /// freed unit to the waiting list.
    async fn release_and_refill(&self, appointment: &Appointment) -> Result<(), DomainError> {
        if let Some(slot_id) = appointment.slot_id {
            let freed = self.slot_service.release(slot_id).await?;
            self.waitlist_service.attempt_fill(&freed, 1).await?;
        }
        Ok(())
    }

    async fn rollback_reservation(&self, slot_id: Uuid) {
        if let Err(err) = self.slot_service.release(slot_id).await {
            warn!(
                "Failed to roll back reservation on slot {}: {}",
                slot_id, err
            );
        }
    }

    async fn restore_appointment(&self, before: &Appointment) {
        let restored = self.appointments.try_update(before.id, |appointment| {
            *appointment = before.clone();
            Ok(())
        });
        if let Err(err) = restored {
            warn!("Failed to restore appointment {}: {}", before.id, err);
        }
    }

    fn ensure_slot_hosts(
        &self,
        slot: &TimeSlot,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if slot.doctor_id != doctor_id {
            return Err(DomainError::Validation(format!(
                "slot {} belongs to a different doctor",
                slot.id
            )));
        }
        if slot.slot_date != start.date_naive()
            || end.date_naive() != start.date_naive()
            || !slot.covers(start.time(), end.time())
        {
            return Err(DomainError::Validation(format!(
                "requested time falls outside the window of slot {}",
                slot.id
            )));
        }
        Ok(())
    }

    fn validate_schedule(
        &self,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<(), DomainError> {
        let rules = &self.validation_rules;

        if duration_minutes < rules.min_appointment_duration {
            return Err(DomainError::Validation(format!(
                "appointment duration must be at least {} minutes",
                rules.min_appointment_duration
            )));
        }
        if duration_minutes > rules.max_appointment_duration {
            return Err(DomainError::Validation(format!(
                "appointment duration cannot exceed {} minutes",
                rules.max_appointment_duration
            )));
        }

        let now = Utc::now();
        if start <= now {
            return Err(DomainError::validation(
                "appointment must be scheduled for a future time",
            ));
        }
        if start <= now + ChronoDuration::hours(rules.min_advance_booking_hours) {
            return Err(DomainError::Validation(format!(
                "appointment must be booked at least {} hours in advance",
                rules.min_advance_booking_hours
            )));
        }
        if start >= now + ChronoDuration::days(rules.max_advance_booking_days) {
            return Err(DomainError::Validation(format!(
                "appointment cannot be booked more than {} days in advance",
                rules.max_advance_booking_days
            )));
        }
        Ok(())
    }
}
