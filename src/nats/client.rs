//! NATS client wrapper
//!
//! Connection management and publish helpers. Runsafe only publishes; delivery
//! to phones and dispatch desks happens in downstream consumers.

use async_nats::{Client, ConnectOptions, HeaderMap, HeaderValue};
use bytes::Bytes;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::types::{Result, RunsafeError};

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Header consumers use to drop redelivered notifications
pub const MSG_ID_HEADER: &str = "Nats-Msg-Id";

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    name: String,
}

impl NatsClient {
    /// Connect, failing fast when the server is unreachable
    pub async fn new(
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
        name: &str,
    ) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        // No retry_on_initial_connect: dev mode falls back to the log notifier
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (user, password) {
            options = options.user_and_password(user.to_string(), pass.to_string());
        }

        let client = options
            .connect(url)
            .await
            .map_err(|e| RunsafeError::Notification(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", url);

        Ok(Self {
            client,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| RunsafeError::Notification(format!("Publish failed: {}", e)))
    }

    /// Publish tagged with a message id for consumer-side deduplication
    pub async fn publish_with_id(&self, subject: &str, msg_id: &str, payload: Bytes) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            MSG_ID_HEADER,
            HeaderValue::from_str(msg_id)
                .map_err(|e| RunsafeError::Notification(format!("Invalid header: {}", e)))?,
        );

        self.client
            .publish_with_headers(subject.to_string(), headers, payload)
            .await
            .map_err(|e| RunsafeError::Notification(format!("Publish failed: {}", e)))
    }

    /// Wait until buffered messages reach the server
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| RunsafeError::Notification(format!("Flush failed: {}", e)))
    }
}
