//! `settings`: show and change the persisted user settings.

use clap::Subcommand;

use super::Error;
use crate::{models::Settings, persistence::traits::KeyValueStore, settings::SettingsStore};

/// Settings operations.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SettingsCommand {
    /// Prints the current settings.
    Show,
    /// Sets the tracked network name.
    SetTarget {
        /// Network name (SSID).
        name: String,
    },
    /// Enables alerts.
    Enable,
    /// Disables alerts. Usage is still recorded.
    Disable,
    /// Sets the push webhook endpoint.
    SetWebhook {
        /// Absolute http(s) URL.
        url: String,
    },
    /// Removes the push webhook endpoint.
    ClearWebhook,
}

/// Applies the command and returns the settings in effect afterwards.
pub async fn execute<T: KeyValueStore>(
    command: &SettingsCommand,
    settings: &SettingsStore<T>,
) -> Result<String, Error> {
    match command {
        SettingsCommand::Show => {}
        SettingsCommand::SetTarget { name } => settings.set_target(name).await?,
        SettingsCommand::Enable => settings.set_enabled(true).await?,
        SettingsCommand::Disable => settings.set_enabled(false).await?,
        SettingsCommand::SetWebhook { url } => settings.set_webhook(url).await?,
        SettingsCommand::ClearWebhook => settings.clear_webhook().await?,
    }
    Ok(render(&settings.load().await?))
}

fn render(settings: &Settings) -> String {
    let target = if settings.target_network_name.is_empty() {
        "(not set)"
    } else {
        settings.target_network_name.as_str()
    };
    format!(
        "target network: {target}\nalerts:         {}\nwebhook:        {}",
        if settings.check_enabled { "enabled" } else { "disabled" },
        settings.webhook_url.as_deref().unwrap_or("(none)"),
    )
}
