// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::DomainError;

use crate::models::AppointmentStatus;

/// The appointment state machine.
///
/// Every status check in the cell funnels through `validate_transition`, so
/// the table below is the single authority on what an appointment may do
/// next. Completed, cancelled, no-show and rescheduled are terminal; no
/// state is exited twice.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_transition(
        &self,
        current: &AppointmentStatus,
        next: &AppointmentStatus,
    ) -> Result<(), DomainError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(DomainError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    pub fn valid_transitions(&self, current: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
                AppointmentStatus::Rescheduled,
            ],
            // Terminal states.
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow
            | AppointmentStatus::Rescheduled => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
