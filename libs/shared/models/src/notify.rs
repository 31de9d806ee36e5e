use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Delivery channels the platform can address. The core only decides what
/// to send and when; transports live behind the dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
}

impl NotificationChannel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "email" => Some(NotificationChannel::Email),
            "sms" => Some(NotificationChannel::Sms),
            "push" => Some(NotificationChannel::Push),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationChannel::Email => write!(f, "email"),
            NotificationChannel::Sms => write!(f, "sms"),
            NotificationChannel::Push => write!(f, "push"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub subject: String,
    pub body: String,
    /// Entity the notification is about (appointment or waiting-list entry).
    pub reference_id: Uuid,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatch rejected: {0}")]
    Rejected(String),

    #[error("Dispatch transport failure: {0}")]
    Transport(String),
}

/// External delivery collaborator. Implementations are expected to be
/// idempotent per (recipient, payload) at-least-once semantics; the core
/// tracks sent/failed state on its side.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: Uuid,
        payload: NotificationPayload,
    ) -> Result<(), DispatchError>;
}
