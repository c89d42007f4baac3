//! Configuration module.

mod app_config;
mod helpers;

pub use app_config::{AppConfig, LocalNotifierKind, SettingsDefaults};
pub use helpers::{
    deserialize_duration_from_seconds, deserialize_nonzero_duration_from_seconds,
    deserialize_webhook_url, parse_webhook_url,
};
