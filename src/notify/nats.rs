//! NATS-backed notifier

use tracing::debug;

use super::{EmergencyNotice, NotificationPayload, NotificationTarget, Notifier};
use crate::emergency::DeliveryStatus;
use crate::nats::NatsClient;
use crate::types::Result;

/// Publishes each notification on its target subject
///
/// A publish only reaches the server, so the record is `sent`, not `delivered`.
pub struct NatsNotifier {
    client: NatsClient,
}

impl NatsNotifier {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Notifier for NatsNotifier {
    async fn notify(
        &self,
        notification_id: &str,
        target: &NotificationTarget,
        notice: &EmergencyNotice,
    ) -> Result<DeliveryStatus> {
        let subject = target.subject();
        let payload = NotificationPayload::new(notification_id, target, notice).to_bytes()?;

        self.client
            .publish_with_id(&subject, notification_id, payload)
            .await?;
        self.client.flush().await?;

        debug!(notification_id, subject = %subject, "Notification published");
        Ok(DeliveryStatus::Sent)
    }

    fn name(&self) -> &'static str {
        "nats"
    }
}
