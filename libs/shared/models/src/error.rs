use thiserror::Error;

/// Error taxonomy shared by every scheduling cell.
///
/// `CapacityExhausted` and `SchedulingConflict` are expected business
/// outcomes surfaced to the caller for user-facing messaging; the core never
/// retries them on its own. `StorageUnavailable` aborts the whole operation
/// it occurred in.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Slot capacity exhausted")]
    CapacityExhausted,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Scheduling conflict: {0}")]
    SchedulingConflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl DomainError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    /// True for rejections a caller can recover from by picking another
    /// time, as opposed to malformed input or infrastructure failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DomainError::CapacityExhausted | DomainError::SchedulingConflict(_)
        )
    }
}
