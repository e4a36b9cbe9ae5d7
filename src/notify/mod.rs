//! Notification delivery - webhook sink for operator alerts

use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Delivery capability for operator-facing messages. Message bodies use
/// markdown-style emphasis (bold markers, code fences); a transport is free
/// to strip that styling.
pub trait Notifier: Send + Sync {
    fn send(
        &self,
        target: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), NotifyError>> + Send;
}

/// Posts alerts to a chat webhook endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self { client, url })
    }
}

impl Notifier for WebhookNotifier {
    async fn send(&self, target: &str, text: &str) -> Result<(), NotifyError> {
        let body = json!({
            "chat_id": target,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self.client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }

        debug!("Delivered notification to {}", target);
        Ok(())
    }
}
