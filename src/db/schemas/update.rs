//! Report update trail documents

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::emergency::{ReportStatus, ReportUpdate};

/// Collection name for report updates
pub const REPORT_UPDATE_COLLECTION: &str = "report_updates";

/// Write-once audit entry; never updated or soft-deleted
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReportUpdateDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub report_id: String,
    pub sequence: u32,
    pub status: ReportStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default)]
    pub flagged: bool,

    pub timestamp: DateTime,
}

impl ReportUpdateDoc {
    pub fn from_domain(update: &ReportUpdate) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            report_id: update.report_id.clone(),
            sequence: update.sequence,
            status: update.status,
            notes: update.notes.clone(),
            flagged: update.flagged,
            timestamp: DateTime::from_chrono(update.timestamp),
        }
    }

    pub fn into_domain(self) -> ReportUpdate {
        ReportUpdate {
            report_id: self.report_id,
            sequence: self.sequence,
            status: self.status,
            notes: self.notes,
            flagged: self.flagged,
            timestamp: self.timestamp.to_chrono(),
        }
    }
}

impl IntoIndexes for ReportUpdateDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "report_id": 1, "sequence": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("report_sequence_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ReportUpdateDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
