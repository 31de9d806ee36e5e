// libs/slot-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// CORE SLOT MODELS
// ==============================================================================

/// A dated, timed, capacity-bounded unit of doctor availability.
///
/// Occupancy is only ever mutated through `SlotService::reserve`/`release`;
/// `is_booked` is derived from occupancy and recomputed on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub occupancy: u32,
    pub is_booked: bool,
    /// Retired slots keep their history but accept no new reservations.
    pub is_available: bool,
    /// Set when the slot was produced by a recurrence run.
    pub recurrence_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeSlot {
    pub fn remaining_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy)
    }

    /// Whether this slot's window fully covers the requested interval.
    pub fn covers(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time <= start && end <= self.end_time
    }

    /// Same-doctor overlap on the same date is a data-integrity violation
    /// caught at creation time, never silently merged.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.doctor_id == other.doctor_id
            && self.slot_date == other.slot_date
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }

    pub(crate) fn recompute_booked(&mut self) {
        self.is_booked = self.occupancy == self.capacity;
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
}

/// A time-of-day window used by recurrence generation. When the bulk request
/// carries a slot duration the window is subdivided; otherwise it becomes a
/// single slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotTemplate {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSlotRequest {
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
    /// Weekday numbers, 0 = Sunday .. 6 = Saturday.
    pub weekdays: Vec<u8>,
    pub templates: Vec<SlotTemplate>,
    /// When set, each template window is cut into slots of this length.
    pub slot_duration_minutes: Option<u32>,
    /// Gap between consecutive generated slots within one template window.
    pub break_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotValidationFailure {
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: String,
}

/// Outcome of a bulk generation run. Individual failures never abort the
/// batch; already-existing slots are skipped so re-runs are idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSlotOutcome {
    pub created: Vec<TimeSlot>,
    pub skipped_existing: usize,
    pub failures: Vec<SlotValidationFailure>,
}

/// A viable slot for a requested interval, as reported by availability
/// checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub slot_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub remaining_capacity: u32,
}

impl From<&TimeSlot> for SlotAvailability {
    fn from(slot: &TimeSlot) -> Self {
        Self {
            slot_id: slot.id,
            doctor_id: slot.doctor_id,
            slot_date: slot.slot_date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            remaining_capacity: slot.remaining_capacity(),
        }
    }
}
