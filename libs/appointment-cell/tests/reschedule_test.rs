// libs/appointment-cell/tests/reschedule_test.rs
//
// Reschedule is a cancel-then-book pair executed as one operation: a failed
// new booking must leave the original appointment and its slot untouched.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentLog, AppointmentStatus, AuditAction, BookAppointmentRequest,
    RescheduleAppointmentRequest,
};
use appointment_cell::services::AppointmentBookingService;
use reminder_cell::models::ReminderStatus;
use reminder_cell::services::ReminderSchedulerService;
use shared_config::SchedulingConfig;
use shared_models::{
    DispatchError, DomainError, NotificationChannel, NotificationDispatcher, NotificationPayload,
};
use shared_store::Table;
use slot_cell::models::{CreateSlotRequest, TimeSlot};
use slot_cell::services::SlotService;
use waitlist_cell::models::{AddWaitingListRequest, WaitingListEntry};
use waitlist_cell::services::WaitingListMatcherService;

#[derive(Default)]
struct CountingDispatcher {
    sent: Mutex<usize>,
}

#[async_trait]
impl NotificationDispatcher for CountingDispatcher {
    async fn send(
        &self,
        _channel: NotificationChannel,
        _recipient: Uuid,
        _payload: NotificationPayload,
    ) -> Result<(), DispatchError> {
        *self.sent.lock().unwrap() += 1;
        Ok(())
    }
}

struct TestSetup {
    booking: AppointmentBookingService,
    slot_service: SlotService,
    reminder_service: Arc<ReminderSchedulerService>,
    waitlist_service: Arc<WaitingListMatcherService>,
    entries: Arc<Table<WaitingListEntry>>,
    doctor_id: Uuid,
    patient_id: Uuid,
}

impl TestSetup {
    fn new() -> Self {
        let slots: Arc<Table<TimeSlot>> = Arc::new(Table::new("time_slot"));
        let appointments = Arc::new(Table::new("appointment"));
        let logs: Arc<Table<AppointmentLog>> = Arc::new(Table::new("appointment_log"));
        let reminders = Arc::new(Table::new("appointment_reminder"));
        let entries: Arc<Table<WaitingListEntry>> = Arc::new(Table::new("waiting_list_entry"));
        let dispatcher = Arc::new(CountingDispatcher::default());

        let reminder_service = Arc::new(ReminderSchedulerService::new(
            reminders,
            dispatcher.clone(),
            &SchedulingConfig::default(),
        ));
        let waitlist_service = Arc::new(WaitingListMatcherService::new(
            Arc::clone(&entries),
            Arc::clone(&slots),
            dispatcher,
        ));
        let booking = AppointmentBookingService::new(
            appointments,
            logs,
            Arc::clone(&slots),
            Arc::clone(&reminder_service),
            Arc::clone(&waitlist_service),
        );

        Self {
            booking,
            slot_service: SlotService::new(slots),
            reminder_service,
            waitlist_service,
            entries,
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
        }
    }

    fn base_date(&self) -> NaiveDate {
        (Utc::now() + Duration::days(7)).date_naive()
    }

    fn start_at(&self, hour: u32) -> DateTime<Utc> {
        self.base_date()
            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
            .and_utc()
    }

    async fn slot_at(&self, hour: u32, capacity: u32) -> TimeSlot {
        self.slot_service
            .create_slot(CreateSlotRequest {
                doctor_id: self.doctor_id,
                slot_date: self.base_date(),
                start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(hour, 30, 0).unwrap(),
                capacity,
            })
            .await
            .unwrap()
    }

    async fn confirmed_booking(&self, slot: &TimeSlot, hour: u32) -> appointment_cell::models::Appointment {
        self.booking
            .book_appointment(
                BookAppointmentRequest {
                    patient_id: self.patient_id,
                    doctor_id: self.doctor_id,
                    slot_id: Some(slot.id),
                    start_time: self.start_at(hour),
                    duration_minutes: 30,
                    consultation_fee: None,
                    patient_notes: None,
                    auto_confirm: true,
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap()
    }

    async fn occupancy(&self, slot_id: Uuid) -> u32 {
        self.slot_service.get_slot(slot_id).await.unwrap().occupancy
    }
}

fn move_to(slot: &TimeSlot, start: DateTime<Utc>) -> RescheduleAppointmentRequest {
    RescheduleAppointmentRequest {
        new_start_time: start,
        new_duration_minutes: None,
        new_slot_id: Some(slot.id),
        reason: Some("doctor unavailable".to_string()),
    }
}

#[tokio::test]
async fn failed_new_reservation_leaves_the_original_untouched() {
    let setup = TestSetup::new();
    let actor = Uuid::new_v4();

    let original_slot = setup.slot_at(9, 1).await;
    let target_slot = setup.slot_at(11, 1).await;

    let appointment = setup.confirmed_booking(&original_slot, 9).await;

    // Fill the target slot so the reschedule has nowhere to go.
    setup.confirmed_booking(&target_slot, 11).await;
    assert_eq!(setup.occupancy(target_slot.id).await, 1);

    let result = setup
        .booking
        .reschedule(appointment.id, move_to(&target_slot, setup.start_at(11)), actor)
        .await;
    assert_matches!(result, Err(DomainError::CapacityExhausted));

    // The original appointment still stands, on its original capacity.
    let current = setup.booking.get_appointment(appointment.id).await.unwrap();
    assert_eq!(current.status, AppointmentStatus::Confirmed);
    assert_eq!(setup.occupancy(original_slot.id).await, 1);
    assert_eq!(setup.occupancy(target_slot.id).await, 1);

    // No stray audit entry was written for the failed attempt.
    let trail = setup.booking.audit_trail(appointment.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::Created);
}

#[tokio::test]
async fn successful_reschedule_chains_and_swaps_capacity() {
    let setup = TestSetup::new();
    let actor = Uuid::new_v4();

    let original_slot = setup.slot_at(9, 1).await;
    let target_slot = setup.slot_at(11, 1).await;

    let appointment = setup.confirmed_booking(&original_slot, 9).await;

    let successor = setup
        .booking
        .reschedule(appointment.id, move_to(&target_slot, setup.start_at(11)), actor)
        .await
        .unwrap();

    // Predecessor is terminal and linked from the successor.
    let predecessor = setup.booking.get_appointment(appointment.id).await.unwrap();
    assert_eq!(predecessor.status, AppointmentStatus::Rescheduled);
    assert_eq!(successor.rescheduled_from, Some(appointment.id));
    assert_eq!(successor.status, AppointmentStatus::Confirmed);
    assert_eq!(successor.slot_id, Some(target_slot.id));

    // Capacity moved from the old slot to the new one.
    assert_eq!(setup.occupancy(original_slot.id).await, 0);
    assert_eq!(setup.occupancy(target_slot.id).await, 1);

    // One entry per mutation on each side of the chain.
    let old_trail = setup.booking.audit_trail(appointment.id).await.unwrap();
    let old_actions: Vec<AuditAction> = old_trail.iter().map(|e| e.action).collect();
    assert_eq!(old_actions, vec![AuditAction::Created, AuditAction::Rescheduled]);

    let new_trail = setup.booking.audit_trail(successor.id).await.unwrap();
    assert_eq!(new_trail.len(), 1);
    assert_eq!(new_trail[0].action, AuditAction::Created);

    // The old appointment's reminders were retired, the successor got fresh ones.
    let old_reminders = setup
        .reminder_service
        .reminders_for_appointment(appointment.id)
        .await
        .unwrap();
    assert!(old_reminders
        .iter()
        .all(|r| r.status == ReminderStatus::Cancelled));
    let new_reminders = setup
        .reminder_service
        .reminders_for_appointment(successor.id)
        .await
        .unwrap();
    assert!(!new_reminders.is_empty());
    assert!(new_reminders
        .iter()
        .all(|r| r.status == ReminderStatus::Pending));
}

#[tokio::test]
async fn reschedule_offers_the_freed_slot_to_the_waiting_list() {
    let setup = TestSetup::new();
    let actor = Uuid::new_v4();

    let original_slot = setup.slot_at(9, 1).await;
    let target_slot = setup.slot_at(11, 1).await;
    let appointment = setup.confirmed_booking(&original_slot, 9).await;

    let entry = setup
        .waitlist_service
        .add_entry(AddWaitingListRequest {
            patient_id: Uuid::new_v4(),
            doctor_id: setup.doctor_id,
            preferred_date: setup.base_date(),
            preferred_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            preferred_end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            priority: 1,
        })
        .await
        .unwrap();

    setup
        .booking
        .reschedule(appointment.id, move_to(&target_slot, setup.start_at(11)), actor)
        .await
        .unwrap();

    // The 09:00 unit came free and the entry wanting the morning was told.
    assert!(setup.entries.require(entry.id).unwrap().notified);
}

#[tokio::test]
async fn rescheduling_a_terminal_appointment_is_rejected() {
    let setup = TestSetup::new();
    let actor = Uuid::new_v4();

    let original_slot = setup.slot_at(9, 1).await;
    let target_slot = setup.slot_at(11, 1).await;
    let appointment = setup.confirmed_booking(&original_slot, 9).await;

    setup.booking.complete(appointment.id, actor).await.unwrap();

    let result = setup
        .booking
        .reschedule(appointment.id, move_to(&target_slot, setup.start_at(11)), actor)
        .await;
    assert_matches!(result, Err(DomainError::InvalidTransition { .. }));

    // The target slot was never touched.
    assert_eq!(setup.occupancy(target_slot.id).await, 0);
}

#[tokio::test]
async fn pending_appointments_reschedule_into_pending_successors() {
    let setup = TestSetup::new();
    let actor = Uuid::new_v4();

    let original_slot = setup.slot_at(9, 1).await;
    let target_slot = setup.slot_at(11, 1).await;

    let appointment = setup
        .booking
        .book_appointment(
            BookAppointmentRequest {
                patient_id: setup.patient_id,
                doctor_id: setup.doctor_id,
                slot_id: Some(original_slot.id),
                start_time: setup.start_at(9),
                duration_minutes: 30,
                consultation_fee: None,
                patient_notes: None,
                auto_confirm: false,
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Pending);

    let successor = setup
        .booking
        .reschedule(appointment.id, move_to(&target_slot, setup.start_at(11)), actor)
        .await
        .unwrap();
    assert_eq!(successor.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn adhoc_reschedule_checks_raw_intervals() {
    let setup = TestSetup::new();
    let actor = Uuid::new_v4();

    // Two ad-hoc appointments an hour apart.
    let first = setup
        .booking
        .book_appointment(
            BookAppointmentRequest {
                patient_id: setup.patient_id,
                doctor_id: setup.doctor_id,
                slot_id: None,
                start_time: setup.start_at(9),
                duration_minutes: 30,
                consultation_fee: None,
                patient_notes: None,
                auto_confirm: true,
            },
            actor,
        )
        .await
        .unwrap();
    let second = setup
        .booking
        .book_appointment(
            BookAppointmentRequest {
                patient_id: Uuid::new_v4(),
                doctor_id: setup.doctor_id,
                slot_id: None,
                start_time: setup.start_at(10),
                duration_minutes: 30,
                consultation_fee: None,
                patient_notes: None,
                auto_confirm: true,
            },
            actor,
        )
        .await
        .unwrap();

    // Moving the first onto the second is a conflict; the first survives.
    let clash = setup
        .booking
        .reschedule(
            first.id,
            RescheduleAppointmentRequest {
                new_start_time: second.appointment_date,
                new_duration_minutes: None,
                new_slot_id: None,
                reason: None,
            },
            actor,
        )
        .await;
    assert_matches!(clash, Err(DomainError::SchedulingConflict(_)));
    assert_eq!(
        setup.booking.get_appointment(first.id).await.unwrap().status,
        AppointmentStatus::Confirmed
    );

    // Moving it to a free hour works, and its own old interval no longer blocks.
    let successor = setup
        .booking
        .reschedule(
            first.id,
            RescheduleAppointmentRequest {
                new_start_time: setup.start_at(9) + Duration::minutes(15),
                new_duration_minutes: None,
                new_slot_id: None,
                reason: None,
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(successor.slot_id, None);
    assert_eq!(successor.rescheduled_from, Some(first.id));
}
