//! Webhook notification implementation.
//!
//! Posts a plain text message to a chat-robot style incoming webhook. Each
//! message is attempted once; the request is bounded by the client timeout.

use std::time::Duration;

use serde_json::json;

use super::error::NotificationError;

/// Implementation of text notifications via incoming webhooks
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    /// HTTP client for webhook requests, carrying the request deadline
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Creates a new Webhook notifier whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).connect_timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Builds the JSON body of a text message.
    pub fn text_payload(content: &str) -> serde_json::Value {
        json!({
            "msgtype": "text",
            "text": { "content": content }
        })
    }

    /// Sends a text message to `url`.
    ///
    /// # Returns
    /// * `Result<(), NotificationError>` - Success, or the transport error or
    ///   non-success status
    pub async fn notify_text(&self, url: &str, content: &str) -> Result<(), NotificationError> {
        if url.trim().is_empty() {
            return Err(NotificationError::ConfigError("Webhook URL is empty".to_string()));
        }

        let payload = Self::text_payload(content);
        let response = self.client.post(url).json(&payload).send().await?;

        let status = response.status();

        if !status.is_success() {
            return Err(NotificationError::NotifyFailed(format!(
                "Webhook request failed with status: {status}"
            )));
        }

        Ok(())
    }
}
