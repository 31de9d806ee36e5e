// libs/waitlist-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A patient's standing request for capacity with a doctor.
///
/// Only active, not-yet-notified entries take part in matching. Once an
/// entry is notified it stays out of automatic matching until it is
/// reactivated externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingListEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub preferred_date: NaiveDate,
    pub preferred_start: NaiveTime,
    pub preferred_end: NaiveTime,
    /// 1 = served first .. 10 = served last.
    pub priority: u8,
    pub is_active: bool,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

impl WaitingListEntry {
    /// Whether this entry's preferred window overlaps a slot window.
    pub fn wants_window(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.preferred_start < end && start < self.preferred_end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWaitingListRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub preferred_date: NaiveDate,
    pub preferred_start: NaiveTime,
    pub preferred_end: NaiveTime,
    pub priority: u8,
}

pub const HIGHEST_PRIORITY: u8 = 1;
pub const LOWEST_PRIORITY: u8 = 10;
