//! MongoDB-backed store
//!
//! Radius queries run as a `$geoNear` aggregation over the 2dsphere index of
//! each collection, which returns the spherical distance in meters alongside
//! every document.

use bson::{doc, Document};
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{ReportStore, SpatialStore};
use crate::db::schemas::{
    EmergencyContactDoc, GeoJsonPoint, HotspotDoc, NotificationDoc, PersonalContactDoc,
    ReportDoc, ReportUpdateDoc, EMERGENCY_CONTACT_COLLECTION, HOTSPOT_COLLECTION,
    NOTIFICATION_COLLECTION, PERSONAL_CONTACT_COLLECTION, REPORT_COLLECTION,
    REPORT_UPDATE_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::emergency::{EmergencyReport, NotificationRecord, ReportUpdate};
use crate::geo::GeoPoint;
use crate::proximity::{EntityKind, Nearby, PersonalContact, ProximityEntity, RiskHotspot};
use crate::types::{Result, RunsafeError};

const DISTANCE_FIELD: &str = "distance";

/// Store over the six runsafe collections
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    emergency_contacts: MongoCollection<EmergencyContactDoc>,
    personal_contacts: MongoCollection<PersonalContactDoc>,
    hotspots: MongoCollection<HotspotDoc>,
    reports: MongoCollection<ReportDoc>,
    updates: MongoCollection<ReportUpdateDoc>,
    notifications: MongoCollection<NotificationDoc>,
}

impl MongoStore {
    /// Open every collection, creating indexes as needed
    pub async fn new(client: MongoClient) -> Result<Self> {
        Ok(Self {
            emergency_contacts: client.collection(EMERGENCY_CONTACT_COLLECTION).await?,
            personal_contacts: client.collection(PERSONAL_CONTACT_COLLECTION).await?,
            hotspots: client.collection(HOTSPOT_COLLECTION).await?,
            reports: client.collection(REPORT_COLLECTION).await?,
            updates: client.collection(REPORT_UPDATE_COLLECTION).await?,
            notifications: client.collection(NOTIFICATION_COLLECTION).await?,
            client,
        })
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }
}

fn geo_near_pipeline(center: GeoPoint, radius_m: f64) -> Vec<Document> {
    let near = GeoJsonPoint::from(center);
    vec![doc! {
        "$geoNear": {
            "near": { "type": near.kind, "coordinates": [near.coordinates[0], near.coordinates[1]] },
            "distanceField": DISTANCE_FIELD,
            "maxDistance": radius_m,
            "spherical": true,
            "query": { "metadata.is_deleted": { "$ne": true } },
        }
    }]
}

/// Decode `$geoNear` output, skipping documents that no longer match the schema
fn decode_near<D, F>(docs: Vec<Document>, into_entity: F) -> Vec<Nearby>
where
    D: DeserializeOwned,
    F: Fn(D) -> ProximityEntity,
{
    docs.into_iter()
        .filter_map(|raw| {
            let distance = raw.get_f64(DISTANCE_FIELD).ok()?;
            match bson::from_document::<D>(raw) {
                Ok(doc) => Some(Nearby {
                    entity: into_entity(doc),
                    distance_meters: distance,
                }),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable geo document");
                    None
                }
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl SpatialStore for MongoStore {
    async fn near(&self, center: GeoPoint, radius_m: f64, kind: EntityKind) -> Result<Vec<Nearby>> {
        let pipeline = geo_near_pipeline(center, radius_m);

        let hits = match kind {
            EntityKind::EmergencyContact => decode_near(
                self.emergency_contacts.aggregate(pipeline).await?,
                |d: EmergencyContactDoc| ProximityEntity::EmergencyContact(d.into_domain()),
            ),
            EntityKind::PersonalContact => decode_near(
                self.personal_contacts.aggregate(pipeline).await?,
                |d: PersonalContactDoc| ProximityEntity::PersonalContact(d.into_domain()),
            ),
            EntityKind::Hotspot => decode_near(
                self.hotspots.aggregate(pipeline).await?,
                |d: HotspotDoc| ProximityEntity::Hotspot(d.into_domain()),
            ),
            EntityKind::LiveUser => Vec::new(),
        };

        Ok(hits)
    }

    async fn personal_contacts(&self, user_id: &str) -> Result<Vec<PersonalContact>> {
        let docs = self
            .personal_contacts
            .find_many(doc! { "user_id": user_id }, Some(doc! { "contact_id": 1 }))
            .await?;
        Ok(docs.into_iter().map(PersonalContactDoc::into_domain).collect())
    }

    async fn upsert_hotspot(&self, hotspot: &RiskHotspot) -> Result<()> {
        self.hotspots
            .upsert_one(
                doc! { "hotspot_id": &hotspot.id },
                HotspotDoc::from_domain(hotspot),
            )
            .await
    }
}

#[async_trait::async_trait]
impl ReportStore for MongoStore {
    async fn insert_report(&self, report: &EmergencyReport) -> Result<()> {
        self.reports.insert_one(ReportDoc::from_domain(report)).await
    }

    async fn update_report(&self, report: &EmergencyReport) -> Result<()> {
        let result = self
            .reports
            .update_one(
                doc! { "report_id": &report.id },
                ReportDoc::status_update(report),
            )
            .await?;

        if result.matched_count == 0 {
            return Err(RunsafeError::NotFound(format!("report {}", report.id)));
        }
        Ok(())
    }

    async fn get_report(&self, report_id: &str) -> Result<Option<EmergencyReport>> {
        Ok(self
            .reports
            .find_one(doc! { "report_id": report_id })
            .await?
            .map(ReportDoc::into_domain))
    }

    async fn reports_for_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EmergencyReport>, u64)> {
        let filter = doc! { "user_id": user_id };
        let total = self.reports.count(filter.clone()).await?;
        let page = self
            .reports
            .find_page(
                filter,
                doc! { "created_at": -1, "report_id": -1 },
                offset as u64,
                limit as i64,
            )
            .await?;

        Ok((page.into_iter().map(ReportDoc::into_domain).collect(), total))
    }

    async fn append_update(&self, update: &ReportUpdate) -> Result<()> {
        self.updates
            .insert_one(ReportUpdateDoc::from_domain(update))
            .await
    }

    async fn updates_for(&self, report_id: &str) -> Result<Vec<ReportUpdate>> {
        let docs = self
            .updates
            .find_many(doc! { "report_id": report_id }, Some(doc! { "sequence": 1 }))
            .await?;
        Ok(docs.into_iter().map(ReportUpdateDoc::into_domain).collect())
    }

    async fn insert_notification(&self, record: &NotificationRecord) -> Result<()> {
        self.notifications
            .insert_one(NotificationDoc::from_domain(record))
            .await
    }

    async fn notifications_for(&self, report_id: &str) -> Result<Vec<NotificationRecord>> {
        let docs = self
            .notifications
            .find_many(doc! { "report_id": report_id }, Some(doc! { "sent_at": 1 }))
            .await?;
        Ok(docs.into_iter().map(NotificationDoc::into_domain).collect())
    }
}
