pub mod audit;
pub mod booking;
pub mod conflict;
pub mod lifecycle;

pub use audit::AuditTrailService;
pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
