pub mod error;
pub mod notify;

pub use error::DomainError;
pub use notify::{
    DispatchError, NotificationChannel, NotificationDispatcher, NotificationPayload,
};
