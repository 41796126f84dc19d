//! Notification record documents

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::emergency::{DeliveryStatus, NotificationRecord, ServiceType, TargetKind};

/// Collection name for notification records
pub const NOTIFICATION_COLLECTION: &str = "notifications";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotificationDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub notification_id: String,
    pub report_id: String,
    pub target_kind: TargetKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,

    pub status: DeliveryStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub sent_at: DateTime,
}

impl NotificationDoc {
    pub fn from_domain(record: &NotificationRecord) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            notification_id: record.id.clone(),
            report_id: record.report_id.clone(),
            target_kind: record.target_kind,
            target_id: record.target_id.clone(),
            service_type: record.service_type,
            status: record.status,
            error: record.error.clone(),
            sent_at: DateTime::from_chrono(record.sent_at),
        }
    }

    pub fn into_domain(self) -> NotificationRecord {
        NotificationRecord {
            id: self.notification_id,
            report_id: self.report_id,
            target_kind: self.target_kind,
            target_id: self.target_id,
            service_type: self.service_type,
            status: self.status,
            error: self.error,
            sent_at: self.sent_at.to_chrono(),
        }
    }
}

impl IntoIndexes for NotificationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "notification_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("notification_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "report_id": 1, "sent_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("report_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for NotificationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_notification_keeps_error() {
        let record = NotificationRecord {
            id: "n1".into(),
            report_id: "r1".into(),
            target_kind: TargetKind::Service,
            target_id: None,
            service_type: Some(ServiceType::Police),
            status: DeliveryStatus::Failed,
            error: Some("timed out after 5000ms".into()),
            sent_at: DateTime::now().to_chrono(),
        };

        let doc = NotificationDoc::from_domain(&record);
        let bson = bson::to_document(&doc).unwrap();
        assert_eq!(bson.get_str("service_type").unwrap(), "police");
        assert!(!bson.contains_key("target_id"));
        assert_eq!(doc.into_domain(), record);
    }
}
