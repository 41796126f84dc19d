//! Emergency report documents

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::{GeoJsonPoint, Metadata};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::emergency::{EmergencyReport, EmergencyType, ReportStatus, Severity};
use crate::geo::Position;

/// Collection name for emergency reports
pub const REPORT_COLLECTION: &str = "emergency_reports";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReportDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub report_id: String,
    pub user_id: String,

    #[serde(rename = "type")]
    pub emergency_type: EmergencyType,

    pub severity: Severity,
    pub status: ReportStatus,
    pub location: GeoJsonPoint,
    pub captured_at: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Seconds
    pub estimated_response_time: u32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl ReportDoc {
    pub fn from_domain(report: &EmergencyReport) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            report_id: report.id.clone(),
            user_id: report.user_id.clone(),
            emergency_type: report.emergency_type,
            severity: report.severity,
            status: report.status,
            location: report.location.point().into(),
            captured_at: DateTime::from_chrono(report.location.captured_at),
            accuracy: report.location.accuracy,
            speed: report.location.speed,
            heading: report.location.heading,
            description: report.description.clone(),
            estimated_response_time: report.estimated_response_time,
            created_at: DateTime::from_chrono(report.created_at),
            updated_at: DateTime::from_chrono(report.updated_at),
        }
    }

    pub fn into_domain(self) -> EmergencyReport {
        let point = self.location.point();
        EmergencyReport {
            id: self.report_id,
            emergency_type: self.emergency_type,
            location: Position {
                lat: point.lat,
                lng: point.lng,
                captured_at: self.captured_at.to_chrono(),
                accuracy: self.accuracy,
                speed: self.speed,
                heading: self.heading,
            },
            severity: self.severity,
            user_id: self.user_id,
            status: self.status,
            description: self.description,
            estimated_response_time: self.estimated_response_time,
            created_at: self.created_at.to_chrono(),
            updated_at: self.updated_at.to_chrono(),
        }
    }

    /// `$set` body applied when a report's status changes
    pub fn status_update(report: &EmergencyReport) -> Document {
        doc! {
            "$set": {
                "status": report.status.as_str(),
                "updated_at": DateTime::from_chrono(report.updated_at),
                "metadata.updated_at": DateTime::now(),
            }
        }
    }
}

impl IntoIndexes for ReportDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "report_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("report_id_unique".to_string())
                        .build(),
                ),
            ),
            // History listing: a user's reports newest first
            (
                doc! { "user_id": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_history_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "location": "2dsphere" },
                Some(
                    IndexOptions::builder()
                        .name("location_2dsphere".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ReportDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
