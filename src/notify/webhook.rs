//! HTTP webhook notifier for dispatch integrations

use std::time::Duration;
use tracing::{debug, warn};

use super::{EmergencyNotice, NotificationPayload, NotificationTarget, Notifier};
use crate::emergency::DeliveryStatus;
use crate::types::{Result, RunsafeError};

/// POSTs the notification payload as JSON; a 2xx answer counts as delivered
pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RunsafeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        notification_id: &str,
        target: &NotificationTarget,
        notice: &EmergencyNotice,
    ) -> Result<DeliveryStatus> {
        let payload = NotificationPayload::new(notification_id, target, notice);

        let response = self
            .http_client
            .post(&self.url)
            .header("Idempotency-Key", notification_id)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RunsafeError::Notification(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(notification_id, status = %status, "Webhook rejected notification");
            return Err(RunsafeError::Notification(format!(
                "Webhook returned {}",
                status
            )));
        }

        debug!(notification_id, url = %self.url, "Webhook delivered notification");
        Ok(DeliveryStatus::Delivered)
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
