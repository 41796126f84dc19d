//! Risk hotspot documents

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::{GeoJsonPoint, Metadata};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::proximity::{HotspotType, RiskHotspot, RiskLevel};

/// Collection name for hotspots
pub const HOTSPOT_COLLECTION: &str = "risk_hotspots";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HotspotDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub hotspot_id: String,
    pub location: GeoJsonPoint,

    #[serde(rename = "type")]
    pub hotspot_type: HotspotType,

    pub level: RiskLevel,
    pub radius_meters: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub reported_at: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime>,
}

impl HotspotDoc {
    pub fn from_domain(hotspot: &RiskHotspot) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            hotspot_id: hotspot.id.clone(),
            location: hotspot.point().into(),
            hotspot_type: hotspot.hotspot_type,
            level: hotspot.level,
            radius_meters: hotspot.radius_meters,
            description: hotspot.description.clone(),
            reported_at: DateTime::from_chrono(hotspot.reported_at),
            verified_at: hotspot.verified_at.map(DateTime::from_chrono),
        }
    }

    pub fn into_domain(self) -> RiskHotspot {
        let point = self.location.point();
        RiskHotspot {
            id: self.hotspot_id,
            lat: point.lat,
            lng: point.lng,
            hotspot_type: self.hotspot_type,
            level: self.level,
            radius_meters: self.radius_meters,
            description: self.description,
            reported_at: self.reported_at.to_chrono(),
            verified_at: self.verified_at.map(|v| v.to_chrono()),
        }
    }
}

impl IntoIndexes for HotspotDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "hotspot_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("hotspot_id_unique".to_string())
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

impl MutMetadata for HotspotDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
