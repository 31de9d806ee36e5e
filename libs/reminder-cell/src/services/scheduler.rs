// libs/reminder-cell/src/services/scheduler.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_models::{
    DomainError, NotificationChannel, NotificationDispatcher, NotificationPayload,
};
use shared_store::Table;

use crate::models::{AppointmentReminder, ReminderOutcome, ReminderStatus, SweepReport};

/// Computes reminder dispatch times relative to appointment time and tracks
/// delivery state.
///
/// The core never delivers anything itself: an external timer drives
/// `process_due`, which hands each due reminder to the injected dispatcher
/// under a short per-item timeout and records the outcome. A reminder
/// reaches `Sent` or permanent `Failed` exactly once; re-marking a sent
/// reminder is a no-op.
pub struct ReminderSchedulerService {
    reminders: Arc<Table<AppointmentReminder>>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    offsets: Vec<ChronoDuration>,
    channels: Vec<NotificationChannel>,
    max_attempts: u32,
    dispatch_timeout: StdDuration,
}

impl ReminderSchedulerService {
    pub fn new(
        reminders: Arc<Table<AppointmentReminder>>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: &SchedulingConfig,
    ) -> Self {
        let offsets = config
            .reminder_offset_hours
            .iter()
            .map(|hours| ChronoDuration::hours(*hours))
            .collect();
        let channels = config
            .reminder_channels
            .iter()
            .filter_map(|name| {
                let parsed = NotificationChannel::parse(name);
                if parsed.is_none() {
                    warn!("Ignoring unknown reminder channel {:?}", name);
                }
                parsed
            })
            .collect();

        Self {
            reminders,
            dispatcher,
            offsets,
            channels,
            max_attempts: config.max_dispatch_attempts.max(1),
            dispatch_timeout: StdDuration::from_millis(config.dispatch_timeout_ms),
        }
    }

    /// Create one pending reminder per configured offset per enabled
    /// channel. Called alongside booking.
    pub async fn schedule_for_appointment(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        appointment_time: DateTime<Utc>,
    ) -> Result<Vec<AppointmentReminder>, DomainError> {
        let mut created = Vec::new();
        for offset in &self.offsets {
            for channel in &self.channels {
                let reminder = AppointmentReminder {
                    id: Uuid::new_v4(),
                    appointment_id,
                    patient_id,
                    channel: *channel,
                    scheduled_for: appointment_time - *offset,
                    sent_at: None,
                    status: ReminderStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    created_at: Utc::now(),
                };
                self.reminders.insert(reminder.id, reminder.clone())?;
                created.push(reminder);
            }
        }

        debug!(
            "Scheduled {} reminder(s) for appointment {}",
            created.len(),
            appointment_id
        );
        Ok(created)
    }

    /// Transition every still-pending reminder of an appointment to
    /// `Cancelled`. Fired reminders are left untouched.
    pub async fn cancel_pending(&self, appointment_id: Uuid) -> Result<usize, DomainError> {
        let pending = self.reminders.filter(|reminder| {
            reminder.appointment_id == appointment_id && reminder.status == ReminderStatus::Pending
        })?;

        let mut cancelled = 0;
        for reminder in pending {
            self.reminders.try_update(reminder.id, |row| {
                if row.status == ReminderStatus::Pending {
                    row.status = ReminderStatus::Cancelled;
                }
                Ok(())
            })?;
            cancelled += 1;
        }

        if cancelled > 0 {
            info!(
                "Cancelled {} pending reminder(s) for appointment {}",
                cancelled, appointment_id
            );
        }
        Ok(cancelled)
    }

    /// All pending reminders whose dispatch time has arrived, oldest first.
    pub async fn due_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AppointmentReminder>, DomainError> {
        let mut due = self.reminders.filter(|reminder| {
            reminder.status == ReminderStatus::Pending && reminder.scheduled_for <= now
        })?;
        due.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        Ok(due)
    }

    /// Record one delivery outcome. `Sent` is terminal and idempotent; a
    /// failure consumes one attempt and keeps the reminder pending until the
    /// retry budget runs out, after which it is permanently failed.
    pub async fn mark_outcome(
        &self,
        reminder_id: Uuid,
        outcome: ReminderOutcome,
    ) -> Result<AppointmentReminder, DomainError> {
        let max_attempts = self.max_attempts;
        self.reminders.try_update(reminder_id, move |reminder| {
            if reminder.status.is_terminal() {
                // Re-reporting an outcome on a concluded reminder is a no-op.
                return Ok(reminder.clone());
            }
            match &outcome {
                ReminderOutcome::Sent => {
                    reminder.status = ReminderStatus::Sent;
                    reminder.sent_at = Some(Utc::now());
                }
                ReminderOutcome::Failed { error } => {
                    reminder.attempts += 1;
                    reminder.last_error = Some(error.clone());
                    if reminder.attempts >= max_attempts {
                        reminder.status = ReminderStatus::Failed;
                    }
                }
            }
            Ok(reminder.clone())
        })
    }

    /// One sweep of the due queue, driven by an external timer. Each item is
    /// dispatched under its own short timeout; no lock is held across the
    /// dispatch call, and a reminder that concluded between snapshot and
    /// dispatch is skipped.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<SweepReport, DomainError> {
        let due = self.due_reminders(now).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };

        for reminder in due {
            if self.reminders.require(reminder.id)?.status.is_terminal() {
                continue;
            }

            let payload = NotificationPayload {
                subject: "Upcoming appointment reminder".to_string(),
                body: format!(
                    "You have an appointment scheduled. Reminder issued at {}.",
                    now.to_rfc3339()
                ),
                reference_id: reminder.appointment_id,
            };

            let dispatch = tokio::time::timeout(
                self.dispatch_timeout,
                self.dispatcher
                    .send(reminder.channel, reminder.patient_id, payload),
            )
            .await;

            let outcome = match dispatch {
                Ok(Ok(())) => ReminderOutcome::Sent,
                Ok(Err(err)) => ReminderOutcome::Failed {
                    error: err.to_string(),
                },
                Err(_) => ReminderOutcome::Failed {
                    error: format!(
                        "dispatch timed out after {} ms",
                        self.dispatch_timeout.as_millis()
                    ),
                },
            };

            let recorded = self.mark_outcome(reminder.id, outcome).await?;
            match recorded.status {
                ReminderStatus::Sent => report.sent += 1,
                ReminderStatus::Failed => {
                    report.failed += 1;
                    report.permanently_failed += 1;
                    warn!(
                        "Reminder {} permanently failed after {} attempt(s)",
                        reminder.id, recorded.attempts
                    );
                }
                ReminderStatus::Pending => report.failed += 1,
                ReminderStatus::Cancelled => {}
            }
        }

        debug!(
            "Reminder sweep examined {}, sent {}, failed {} ({} permanently)",
            report.examined, report.sent, report.failed, report.permanently_failed
        );
        Ok(report)
    }

    pub async fn reminders_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<AppointmentReminder>, DomainError> {
        let mut reminders = self
            .reminders
            .filter(|reminder| reminder.appointment_id == appointment_id)?;
        reminders.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        Ok(reminders)
    }
}
