use std::env;

use dotenv::dotenv;
use tracing::warn;

/// Runtime configuration for the scheduling core, loaded from the
/// environment. Every knob has a default so a bare process still behaves
/// sensibly; misconfigured values are logged and replaced, never fatal.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Hours before the appointment at which a reminder fires, e.g. [24, 2].
    pub reminder_offset_hours: Vec<i64>,
    /// Enabled reminder channels by name ("email", "sms", "push").
    pub reminder_channels: Vec<String>,
    /// Dispatch attempts per reminder before it is permanently failed.
    pub max_dispatch_attempts: u32,
    /// Per-item timeout for a single dispatcher call during the sweep.
    pub dispatch_timeout_ms: u64,
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        dotenv().ok();

        let config = Self {
            reminder_offset_hours: env::var("REMINDER_OFFSET_HOURS")
                .ok()
                .map(|raw| parse_offset_hours(&raw))
                .unwrap_or_else(Self::default_offsets),
            reminder_channels: env::var("REMINDER_CHANNELS")
                .ok()
                .map(|raw| parse_csv(&raw))
                .unwrap_or_else(Self::default_channels),
            max_dispatch_attempts: env::var("MAX_DISPATCH_ATTEMPTS")
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(3),
            dispatch_timeout_ms: env::var("DISPATCH_TIMEOUT_MS")
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(2_000),
        };

        if config.reminder_offset_hours.is_empty() {
            warn!("REMINDER_OFFSET_HOURS parsed to nothing, reminders disabled");
        }
        if config.reminder_channels.is_empty() {
            warn!("REMINDER_CHANNELS parsed to nothing, reminders disabled");
        }

        config
    }

    fn default_offsets() -> Vec<i64> {
        vec![24, 2]
    }

    fn default_channels() -> Vec<String> {
        vec!["email".to_string(), "sms".to_string()]
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            reminder_offset_hours: Self::default_offsets(),
            reminder_channels: Self::default_channels(),
            max_dispatch_attempts: 3,
            dispatch_timeout_ms: 2_000,
        }
    }
}

fn parse_offset_hours(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.parse::<i64>() {
                Ok(hours) if hours > 0 => Some(hours),
                _ => {
                    warn!("Ignoring invalid reminder offset {:?}", part);
                    None
                }
            }
        })
        .collect()
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}
