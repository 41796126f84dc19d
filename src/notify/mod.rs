//! Outbound notification port
//!
//! The emergency cascade hands every target to a [`Notifier`]. Implementations:
//!
//! - [`NatsNotifier`]: publishes to `runsafe.notify.personal.<contactId>` and
//!   `runsafe.notify.service.<type>`
//! - [`WebhookNotifier`]: POSTs the same payload to a dispatch endpoint
//! - [`LogNotifier`]: logs only (dev mode)
//! - [`RoutedNotifier`]: sends personal and service targets to different notifiers

mod nats;
mod webhook;

pub use self::nats::NatsNotifier;
pub use webhook::WebhookNotifier;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::emergency::{
    DeliveryStatus, EmergencyReport, EmergencyType, ServiceType, Severity, TargetKind,
};
use crate::proximity::PersonalContact;
use crate::types::Result;

/// Subject prefix of every notification
pub const SUBJECT_PREFIX: &str = "runsafe.notify";

/// Recipient of one cascade notification
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationTarget {
    Personal(PersonalContact),
    Service(ServiceType),
}

impl NotificationTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Personal(_) => TargetKind::Personal,
            Self::Service(_) => TargetKind::Service,
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Personal(contact) => Some(&contact.id),
            Self::Service(_) => None,
        }
    }

    pub fn service_type(&self) -> Option<ServiceType> {
        match self {
            Self::Personal(_) => None,
            Self::Service(service) => Some(*service),
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::Personal(contact) => format!("{}.personal.{}", SUBJECT_PREFIX, contact.id),
            Self::Service(service) => format!("{}.service.{}", SUBJECT_PREFIX, service.as_str()),
        }
    }
}

/// What recipients learn about an emergency
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyNotice {
    pub report_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub emergency_type: EmergencyType,
    pub severity: Severity,
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub estimated_response_time: u32,
    pub created_at: DateTime<Utc>,
}

impl EmergencyNotice {
    pub fn from_report(report: &EmergencyReport) -> Self {
        Self {
            report_id: report.id.clone(),
            user_id: report.user_id.clone(),
            emergency_type: report.emergency_type,
            severity: report.severity,
            lat: report.location.lat,
            lng: report.location.lng,
            description: report.description.clone(),
            estimated_response_time: report.estimated_response_time,
            created_at: report.created_at,
        }
    }
}

/// Wire payload shared by the NATS and webhook notifiers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload<'a> {
    pub notification_id: &'a str,
    pub target_kind: TargetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
    pub notice: &'a EmergencyNotice,
}

impl<'a> NotificationPayload<'a> {
    pub fn new(
        notification_id: &'a str,
        target: &'a NotificationTarget,
        notice: &'a EmergencyNotice,
    ) -> Self {
        let phone = match target {
            NotificationTarget::Personal(contact) => Some(contact.phone.as_str()),
            NotificationTarget::Service(_) => None,
        };
        Self {
            notification_id,
            target_kind: target.kind(),
            target_id: target.target_id(),
            service_type: target.service_type(),
            phone,
            notice,
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Delivers one notification
///
/// Returns `Sent` when handed to a transport without delivery confirmation,
/// `Delivered` when the receiver acknowledged it. Errors are recorded as
/// `failed` by the cascade and never abort it.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        notification_id: &str,
        target: &NotificationTarget,
        notice: &EmergencyNotice,
    ) -> Result<DeliveryStatus>;

    fn name(&self) -> &'static str;
}

/// Logs every notification; used when no transport is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        notification_id: &str,
        target: &NotificationTarget,
        notice: &EmergencyNotice,
    ) -> Result<DeliveryStatus> {
        info!(
            notification_id,
            report_id = %notice.report_id,
            subject = %target.subject(),
            "Notification (log only)"
        );
        Ok(DeliveryStatus::Sent)
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Sends personal targets and service targets through different notifiers
pub struct RoutedNotifier {
    personal: Arc<dyn Notifier>,
    services: Arc<dyn Notifier>,
}

impl RoutedNotifier {
    pub fn new(personal: Arc<dyn Notifier>, services: Arc<dyn Notifier>) -> Self {
        Self { personal, services }
    }
}

#[async_trait::async_trait]
impl Notifier for RoutedNotifier {
    async fn notify(
        &self,
        notification_id: &str,
        target: &NotificationTarget,
        notice: &EmergencyNotice,
    ) -> Result<DeliveryStatus> {
        match target {
            NotificationTarget::Personal(_) => {
                self.personal.notify(notification_id, target, notice).await
            }
            NotificationTarget::Service(_) => {
                self.services.notify(notification_id, target, notice).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "routed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunsafeError;

    fn contact() -> PersonalContact {
        PersonalContact {
            id: "pc1".into(),
            user_id: "u1".into(),
            name: "Mei".into(),
            phone: "13800000000".into(),
            relationship: None,
            notify_on_emergency: true,
            location: None,
        }
    }

    fn notice() -> EmergencyNotice {
        EmergencyNotice {
            report_id: "r1".into(),
            user_id: "u1".into(),
            emergency_type: EmergencyType::Sos,
            severity: crate::proximity::RiskLevel::Critical,
            lat: 31.23,
            lng: 121.47,
            description: None,
            estimated_response_time: 150,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_subjects() {
        assert_eq!(
            NotificationTarget::Personal(contact()).subject(),
            "runsafe.notify.personal.pc1"
        );
        assert_eq!(
            NotificationTarget::Service(ServiceType::Medical).subject(),
            "runsafe.notify.service.medical"
        );
    }

    #[test]
    fn test_payload_shape() {
        let target = NotificationTarget::Personal(contact());
        let notice = notice();
        let payload = NotificationPayload::new("n1", &target, &notice);
        let json: serde_json::Value = serde_json::from_slice(&payload.to_bytes().unwrap()).unwrap();

        assert_eq!(json["notificationId"], "n1");
        assert_eq!(json["targetKind"], "personal");
        assert_eq!(json["phone"], "13800000000");
        assert_eq!(json["notice"]["type"], "sos");
        assert!(json.get("serviceType").is_none());
    }

    struct Failing;

    #[async_trait::async_trait]
    impl Notifier for Failing {
        async fn notify(
            &self,
            _: &str,
            _: &NotificationTarget,
            _: &EmergencyNotice,
        ) -> Result<DeliveryStatus> {
            Err(RunsafeError::Notification("down".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_routed_notifier_splits_by_target() {
        let routed = RoutedNotifier::new(Arc::new(LogNotifier), Arc::new(Failing));
        let notice = notice();

        let personal = routed
            .notify("n1", &NotificationTarget::Personal(contact()), &notice)
            .await;
        assert_eq!(personal.unwrap(), DeliveryStatus::Sent);

        let service = routed
            .notify("n2", &NotificationTarget::Service(ServiceType::Police), &notice)
            .await;
        assert!(service.is_err());
    }
}
