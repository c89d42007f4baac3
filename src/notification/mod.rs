//! # Notification Service
//!
//! Delivers alerts chosen by the alert policy. Local alerts go to a
//! [`LocalNotifier`], webhook alerts to the [`WebhookNotifier`].
//!
//! ## Delivery model
//!
//! Every delivery runs as its own background task tracked by the
//! [`AlertDispatcher`]. The caller never waits for a delivery, and a failed
//! delivery is logged and dropped: it is neither retried nor reported back,
//! and it never touches the ledger or the throttle state. On shutdown,
//! [`AlertDispatcher::drain`] gives in-flight deliveries a bounded amount of
//! time to finish.

use std::{sync::Arc, time::Duration};

use tokio_util::task::TaskTracker;

use crate::models::Alert;

pub mod error;
mod local;
mod webhook;

pub use local::{DesktopNotifier, LocalNotifier, LogNotifier, local_notifier_for};
pub use webhook::WebhookNotifier;

/// Fire-and-forget delivery of alerts.
pub struct AlertDispatcher {
    local: Arc<dyn LocalNotifier>,
    webhook: Arc<WebhookNotifier>,
    tracker: TaskTracker,
}

impl AlertDispatcher {
    /// Creates a dispatcher over the given delivery backends.
    pub fn new(local: Arc<dyn LocalNotifier>, webhook: Arc<WebhookNotifier>) -> Self {
        Self { local, webhook, tracker: TaskTracker::new() }
    }

    /// Starts delivering each alert on its own task and returns immediately.
    pub fn dispatch(&self, alerts: Vec<Alert>) {
        for alert in alerts {
            let local = Arc::clone(&self.local);
            let webhook = Arc::clone(&self.webhook);
            self.tracker.spawn(async move {
                let kind = alert.kind();
                let result = match &alert {
                    Alert::Webhook { url, content } => webhook.notify_text(url, content).await,
                    other => local.notify(&other.title(), &other.body()).await,
                };
                match result {
                    Ok(()) => tracing::debug!(kind = %kind, "Alert delivered."),
                    Err(e) => tracing::warn!(kind = %kind, error = %e, "Alert delivery failed."),
                }
            });
        }
    }

    /// Number of deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `timeout` for in-flight deliveries. Deliveries still
    /// running afterwards are abandoned.
    pub async fn drain(&self, timeout: Duration) {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Timed out waiting for alert deliveries, abandoning them."
            );
        }
        self.tracker.reopen();
    }
}
