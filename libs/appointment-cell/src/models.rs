// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booking of capacity within a slot, or an ad-hoc booking outside slot
/// management when `slot_id` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// The slot whose capacity this appointment consumes. The slot is a
    /// shared resource referenced for occupancy accounting, never owned.
    pub slot_id: Option<Uuid>,
    /// Scheduled start instant.
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub consultation_fee: Option<f64>,
    pub is_paid: bool,
    pub cancellation_reason: Option<String>,
    /// Predecessor in a reschedule chain. An index lookup by id, not an
    /// ownership edge.
    pub rescheduled_from: Option<Uuid>,
    pub patient_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.appointment_date + chrono::Duration::minutes(self.duration_minutes as i64)
    }

    /// Live appointments are the ones consuming capacity.
    pub fn is_live(&self) -> bool {
        !matches!(
            self.status,
            AppointmentStatus::Cancelled
                | AppointmentStatus::Rescheduled
                | AppointmentStatus::NoShow
        )
    }

    /// Structured snapshot for audit before/after states.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
                | AppointmentStatus::Rescheduled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

// ==============================================================================
// AUDIT TRAIL MODELS
// ==============================================================================

/// Append-only audit record of one appointment mutation. Never updated or
/// deleted after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentLog {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub action: AuditAction,
    pub actor_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub before_state: Option<Value>,
    pub after_state: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Confirmed,
    Cancelled,
    Rescheduled,
    Completed,
    NoShow,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Created => write!(f, "created"),
            AuditAction::Confirmed => write!(f, "confirmed"),
            AuditAction::Cancelled => write!(f, "cancelled"),
            AuditAction::Rescheduled => write!(f, "rescheduled"),
            AuditAction::Completed => write!(f, "completed"),
            AuditAction::NoShow => write!(f, "no_show"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// When set, the booking consumes a unit of this slot's capacity; when
    /// absent the appointment is ad-hoc and checked against raw intervals.
    pub slot_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub consultation_fee: Option<f64>,
    pub patient_notes: Option<String>,
    /// Book straight into `confirmed` instead of `pending`.
    pub auto_confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
    pub cancelled_by: CancelledBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
    pub new_duration_minutes: Option<i32>,
    /// Slot backing the new appointment, if any.
    pub new_slot_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Simple counts only; richer aggregation belongs to the reporting layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentStats {
    pub total_appointments: usize,
    pub completed_appointments: usize,
    pub cancelled_appointments: usize,
    pub no_show_appointments: usize,
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    /// Zero means "any future instant is bookable".
    pub min_advance_booking_hours: i64,
    pub max_advance_booking_days: i64,
    pub min_appointment_duration: i32,
    pub max_appointment_duration: i32,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            min_advance_booking_hours: 0,
            max_advance_booking_days: 365,
            min_appointment_duration: 5,
            max_appointment_duration: 240,
        }
    }
}
