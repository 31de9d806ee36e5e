// libs/reminder-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::NotificationChannel;

/// A scheduled notification intent for an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentReminder {
    pub id: Uuid,
    pub appointment_id: Uuid,
    /// Recipient of the reminder.
    pub patient_id: Uuid,
    pub channel: NotificationChannel,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: ReminderStatus,
    /// Dispatch attempts consumed so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl ReminderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReminderStatus::Pending)
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderStatus::Pending => write!(f, "pending"),
            ReminderStatus::Sent => write!(f, "sent"),
            ReminderStatus::Failed => write!(f, "failed"),
            ReminderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one delivery attempt, reported back by the sweep or by the
/// external dispatcher's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    Sent,
    Failed { error: String },
}

/// Tally of one `process_due` sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
    /// Reminders that exhausted their retry budget during this sweep.
    pub permanently_failed: usize,
}
