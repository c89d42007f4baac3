//! Local (on-device) notification backends.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use super::error::NotificationError;
use crate::config::LocalNotifierKind;

const NOTIFY_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// A sink for user-facing notifications on this device.
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    /// Shows a notification.
    async fn notify(&self, title: &str, body: &str) -> Result<(), NotificationError>;
}

/// Creates the notifier selected in the configuration.
pub fn local_notifier_for(kind: LocalNotifierKind) -> Arc<dyn LocalNotifier> {
    match kind {
        LocalNotifierKind::Desktop => Arc::new(DesktopNotifier::default()),
        LocalNotifierKind::Log => Arc::new(LogNotifier),
    }
}

/// Desktop notifications through the freedesktop `notify-send` tool.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self { app_name: "wifi-ledger".to_string() }
    }
}

#[async_trait]
impl LocalNotifier for DesktopNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        let output = tokio::time::timeout(
            NOTIFY_SEND_TIMEOUT,
            Command::new("notify-send")
                .arg("--app-name")
                .arg(&self.app_name)
                .arg("--urgency=normal")
                .arg(title)
                .arg(body)
                .output(),
        )
        .await
        .map_err(|_| NotificationError::NotifyFailed("notify-send timed out".to_string()))?
        .map_err(|e| NotificationError::NotifyFailed(format!("notify-send failed: {e}")))?;

        if !output.status.success() {
            return Err(NotificationError::NotifyFailed(format!(
                "notify-send exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Writes notifications to the log. Used on headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl LocalNotifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        tracing::warn!(title, body, "Notification");
        Ok(())
    }
}
