// libs/appointment-cell/src/services/audit.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_models::DomainError;
use shared_store::Table;

use crate::models::{AppointmentLog, AuditAction};

/// Append-only trail of appointment mutations.
///
/// Audit is not best-effort: `record` only fails when the store itself is
/// unavailable, and callers must then fail the business operation that
/// triggered it. Every committed mutation has exactly one entry, or
/// neither happens.
pub struct AuditTrailService {
    logs: Arc<Table<AppointmentLog>>,
}

impl AuditTrailService {
    pub fn new(logs: Arc<Table<AppointmentLog>>) -> Self {
        Self { logs }
    }

    pub async fn record(
        &self,
        appointment_id: Uuid,
        action: AuditAction,
        actor_id: Uuid,
        before_state: Option<Value>,
        after_state: Value,
        notes: Option<String>,
    ) -> Result<AppointmentLog, DomainError> {
        let entry = AppointmentLog {
            id: Uuid::new_v4(),
            appointment_id,
            action,
            actor_id,
            recorded_at: Utc::now(),
            notes,
            before_state,
            after_state,
        };
        self.logs.insert(entry.id, entry.clone())?;

        debug!(
            "Audit entry {} recorded: {} on appointment {} by {}",
            entry.id, action, appointment_id, actor_id
        );
        Ok(entry)
    }

    /// Entries for one appointment, oldest first.
    pub async fn entries_for(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<AppointmentLog>, DomainError> {
        let mut entries = self
            .logs
            .filter(|entry| entry.appointment_id == appointment_id)?;
        entries.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(entries)
    }
}
