//! In-memory store
//!
//! Used in dev mode when MongoDB is not reachable, and by tests. The
//! `set_available` switch simulates a backend outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{ReportStore, SpatialStore};
use crate::emergency::{EmergencyReport, NotificationRecord, ReportUpdate};
use crate::geo::{distance_meters, GeoPoint};
use crate::proximity::{
    EmergencyContact, EntityKind, Nearby, PersonalContact, ProximityEntity, RiskHotspot,
};
use crate::types::{Result, RunsafeError};

#[derive(Default)]
struct Tables {
    emergency_contacts: HashMap<String, EmergencyContact>,
    personal_contacts: HashMap<String, PersonalContact>,
    hotspots: HashMap<String, RiskHotspot>,
    reports: HashMap<String, EmergencyReport>,
    updates: HashMap<String, Vec<ReportUpdate>>,
    notifications: HashMap<String, Vec<NotificationRecord>>,
}

/// Process-local implementation of both storage ports
pub struct MemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated availability of the backend
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RunsafeError::SourceUnavailable("memory store offline".into()))
        }
    }

    pub async fn insert_emergency_contact(&self, contact: EmergencyContact) {
        self.tables
            .write()
            .await
            .emergency_contacts
            .insert(contact.id.clone(), contact);
    }

    pub async fn insert_personal_contact(&self, contact: PersonalContact) {
        self.tables
            .write()
            .await
            .personal_contacts
            .insert(contact.id.clone(), contact);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn hit(center: GeoPoint, radius_m: f64, entity: ProximityEntity) -> Option<Nearby> {
    let distance = distance_meters(center, entity.point()?);
    (distance <= radius_m).then_some(Nearby {
        entity,
        distance_meters: distance,
    })
}

#[async_trait::async_trait]
impl SpatialStore for MemoryStore {
    async fn near(&self, center: GeoPoint, radius_m: f64, kind: EntityKind) -> Result<Vec<Nearby>> {
        self.check()?;
        let tables = self.tables.read().await;

        let hits = match kind {
            EntityKind::EmergencyContact => tables
                .emergency_contacts
                .values()
                .filter_map(|c| hit(center, radius_m, ProximityEntity::EmergencyContact(c.clone())))
                .collect(),
            EntityKind::PersonalContact => tables
                .personal_contacts
                .values()
                .filter_map(|c| hit(center, radius_m, ProximityEntity::PersonalContact(c.clone())))
                .collect(),
            EntityKind::Hotspot => tables
                .hotspots
                .values()
                .filter_map(|h| hit(center, radius_m, ProximityEntity::Hotspot(h.clone())))
                .collect(),
            EntityKind::LiveUser => Vec::new(),
        };

        Ok(hits)
    }

    async fn personal_contacts(&self, user_id: &str) -> Result<Vec<PersonalContact>> {
        self.check()?;
        let mut contacts: Vec<PersonalContact> = self
            .tables
            .read()
            .await
            .personal_contacts
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        contacts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(contacts)
    }

    async fn upsert_hotspot(&self, hotspot: &RiskHotspot) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .hotspots
            .insert(hotspot.id.clone(), hotspot.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: &EmergencyReport) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .reports
            .insert(report.id.clone(), report.clone());
        Ok(())
    }

    async fn update_report(&self, report: &EmergencyReport) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        match tables.reports.get_mut(&report.id) {
            Some(existing) => {
                *existing = report.clone();
                Ok(())
            }
            None => Err(RunsafeError::NotFound(format!("report {}", report.id))),
        }
    }

    async fn get_report(&self, report_id: &str) -> Result<Option<EmergencyReport>> {
        self.check()?;
        Ok(self.tables.read().await.reports.get(report_id).cloned())
    }

    async fn reports_for_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EmergencyReport>, u64)> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut reports: Vec<&EmergencyReport> = tables
            .reports
            .values()
            .filter(|r| r.user_id == user_id)
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = reports.len() as u64;
        let page = reports
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn append_update(&self, update: &ReportUpdate) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .updates
            .entry(update.report_id.clone())
            .or_default()
            .push(update.clone());
        Ok(())
    }

    async fn updates_for(&self, report_id: &str) -> Result<Vec<ReportUpdate>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .await
            .updates
            .get(report_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_notification(&self, record: &NotificationRecord) -> Result<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .notifications
            .entry(record.report_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn notifications_for(&self, report_id: &str) -> Result<Vec<NotificationRecord>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .await
            .notifications
            .get(report_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::{ContactType, HotspotType, RiskLevel};

    fn station(id: &str, lat: f64, lng: f64) -> EmergencyContact {
        EmergencyContact {
            id: id.into(),
            name: format!("Station {}", id),
            phone: "110".into(),
            contact_type: ContactType::Police,
            lat,
            lng,
        }
    }

    #[tokio::test]
    async fn test_near_filters_by_radius() {
        let store = MemoryStore::new();
        store.insert_emergency_contact(station("near", 31.2310, 121.4740)).await;
        store.insert_emergency_contact(station("far", 31.3000, 121.6000)).await;

        let hits = store
            .near(GeoPoint::new(31.2304, 121.4737), 1_000.0, EntityKind::EmergencyContact)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.id(), "near");
    }

    #[tokio::test]
    async fn test_outage_reports_source_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);

        let hotspot = RiskHotspot::reported(
            GeoPoint::new(31.23, 121.47),
            HotspotType::Lighting,
            RiskLevel::Medium,
            100.0,
        );
        assert!(matches!(
            store.upsert_hotspot(&hotspot).await,
            Err(RunsafeError::SourceUnavailable(_))
        ));

        store.set_available(true);
        tokio_test::assert_ok!(store.upsert_hotspot(&hotspot).await);
    }
}
