//! Proximity index
//!
//! Radius queries over everything a runner can be near: public responders,
//! personal contacts, risk hotspots (delegated to the [`SpatialStore`]) and
//! other live runners (a linear scan of the shared [`LiveSessionTable`]).
//!
//! Results are ordered by distance, ties by entity id, so identical inputs
//! always produce identical output.
//!
//! The live scan is linear in the number of sessions. That is fine for the
//! thousands of concurrent runners the table is capped at (`max_live_sessions`).

mod entity;
mod fallback;
mod live;

pub use entity::{
    ContactType, EmergencyContact, EntityKind, HotspotType, LiveUser, Nearby, PersonalContact,
    ProximityEntity, RiskHotspot, RiskLevel, HOTSPOT_UNVERIFIED_TTL_DAYS,
};
pub use fallback::fallback_contacts;
pub use live::{LiveSession, LiveSessionTable, SessionSender};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::geo::{distance_meters, GeoPoint, Position};
use crate::store::SpatialStore;
use crate::types::{Result, RunsafeError};

/// Largest radius a hotspot may cover, and the widest hotspot query accepted
pub const MAX_HOTSPOT_RADIUS_M: f64 = 5_000.0;

/// Query result that may have been served from fallback data
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub results: Vec<Nearby>,
    /// True when the store was unavailable and fallback data was returned
    pub degraded: bool,
}

pub struct ProximityIndex {
    store: Arc<dyn SpatialStore>,
    live: Arc<LiveSessionTable>,
}

impl ProximityIndex {
    pub fn new(store: Arc<dyn SpatialStore>, live: Arc<LiveSessionTable>) -> Self {
        Self { store, live }
    }

    pub fn store(&self) -> &Arc<dyn SpatialStore> {
        &self.store
    }

    /// The live-session table shared with the broadcaster
    pub fn live_table(&self) -> &Arc<LiveSessionTable> {
        &self.live
    }

    /// Entities of `kind` within `radius_m` of `center`, nearest first
    pub async fn query(
        &self,
        center: GeoPoint,
        radius_m: f64,
        kind: EntityKind,
        limit: Option<usize>,
    ) -> Result<Vec<Nearby>> {
        self.query_at(center, radius_m, kind, limit, Utc::now()).await
    }

    /// As [`query`](Self::query), judging hotspot expiry at `now`
    pub async fn query_at(
        &self,
        center: GeoPoint,
        radius_m: f64,
        kind: EntityKind,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Nearby>> {
        center.validate()?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(RunsafeError::BadRequest(format!(
                "radius must be a non-negative number of meters, got {}",
                radius_m
            )));
        }

        let mut hits = if kind.is_at_rest() {
            self.store.near(center, radius_m, kind).await?
        } else {
            self.scan_live(center, radius_m)
        };

        hits.retain(|hit| match &hit.entity {
            ProximityEntity::Hotspot(hotspot) => hotspot.is_active_at(now),
            _ => true,
        });
        hits.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| a.entity.id().cmp(b.entity.id()))
        });
        if let Some(limit) = limit {
            hits.truncate(limit);
        }

        debug!(kind = ?kind, radius_m, count = hits.len(), "Proximity query");
        Ok(hits)
    }

    /// Query, degrading to static data when the store is unreachable.
    ///
    /// Hotspots and personal contacts degrade to an empty set, emergency
    /// contacts to the hotline set. Validation errors still propagate.
    pub async fn query_or_fallback(
        &self,
        center: GeoPoint,
        radius_m: f64,
        kind: EntityKind,
        limit: Option<usize>,
    ) -> Result<QueryOutcome> {
        match self.query(center, radius_m, kind, limit).await {
            Ok(results) => Ok(QueryOutcome {
                results,
                degraded: false,
            }),
            Err(RunsafeError::SourceUnavailable(reason)) => {
                warn!(kind = ?kind, reason = %reason, "Spatial store unavailable, serving fallback");
                let mut results = match kind {
                    EntityKind::EmergencyContact => fallback_contacts(center),
                    _ => Vec::new(),
                };
                if let Some(limit) = limit {
                    results.truncate(limit);
                }
                Ok(QueryOutcome {
                    results,
                    degraded: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Active hotspots whose own radius covers `point`, nearest centre first.
    ///
    /// Scans out to [`MAX_HOTSPOT_RADIUS_M`] so a large zone is found even
    /// when its centre is far away.
    pub async fn hotspots_containing(&self, point: GeoPoint) -> Result<QueryOutcome> {
        let mut outcome = self
            .query_or_fallback(point, MAX_HOTSPOT_RADIUS_M, EntityKind::Hotspot, None)
            .await?;
        outcome.results.retain(|hit| match &hit.entity {
            ProximityEntity::Hotspot(hotspot) => hit.distance_meters <= hotspot.radius_meters,
            _ => false,
        });
        Ok(outcome)
    }

    /// Record the latest position of `user_id`
    pub fn upsert_live(&self, user_id: &str, position: Position) -> Result<()> {
        position.point().validate()?;
        self.live.upsert_position(user_id, position);
        Ok(())
    }

    /// Drop `user_id` from the live table
    pub fn remove_live(&self, user_id: &str) -> Option<LiveSession> {
        self.live.remove(user_id)
    }

    /// A user's personal contacts
    pub async fn personal_contacts(&self, user_id: &str) -> Result<Vec<PersonalContact>> {
        self.store.personal_contacts(user_id).await
    }

    /// Persist a reported hotspot
    pub async fn report_hotspot(&self, hotspot: &RiskHotspot) -> Result<()> {
        hotspot.point().validate()?;
        if !hotspot.radius_meters.is_finite() || hotspot.radius_meters <= 0.0 {
            return Err(RunsafeError::BadRequest(
                "hotspot radius must be positive".into(),
            ));
        }
        if hotspot.radius_meters > MAX_HOTSPOT_RADIUS_M {
            return Err(RunsafeError::BadRequest(format!(
                "hotspot radius may not exceed {} meters",
                MAX_HOTSPOT_RADIUS_M
            )));
        }
        self.store
            .upsert_hotspot(hotspot)
            .await
            .map_err(RunsafeError::into_persistence)
    }

    fn scan_live(&self, center: GeoPoint, radius_m: f64) -> Vec<Nearby> {
        self.live
            .live_users()
            .into_iter()
            .filter_map(|user| {
                let distance = distance_meters(center, GeoPoint::new(user.lat, user.lng));
                (distance <= radius_m).then_some(Nearby {
                    entity: ProximityEntity::LiveUser(user),
                    distance_meters: distance,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    const CENTER: GeoPoint = GeoPoint::new(31.2304, 121.4737);

    fn index() -> (ProximityIndex, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let index = ProximityIndex::new(store.clone(), Arc::new(LiveSessionTable::new(100)));
        (index, store)
    }

    fn station(id: &str, lat: f64, lng: f64) -> EmergencyContact {
        EmergencyContact {
            id: id.into(),
            name: id.into(),
            phone: "110".into(),
            contact_type: ContactType::Police,
            lat,
            lng,
        }
    }

    #[tokio::test]
    async fn test_results_ordered_by_distance_then_id() {
        let (index, store) = index();
        store.insert_emergency_contact(station("b", 31.2314, 121.4737)).await;
        store.insert_emergency_contact(station("a", 31.2314, 121.4737)).await;
        store.insert_emergency_contact(station("c", 31.2305, 121.4737)).await;

        let hits = index
            .query(CENTER, 1_000.0, EntityKind::EmergencyContact, None)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entity.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let limited = index
            .query(CENTER, 1_000.0, EntityKind::EmergencyContact, Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_hotspots_are_excluded() {
        let (index, store) = index();
        let mut stale = RiskHotspot::reported(CENTER, HotspotType::Crime, RiskLevel::High, 100.0);
        stale.reported_at = Utc::now() - Duration::days(8);
        let fresh = RiskHotspot::reported(CENTER, HotspotType::Lighting, RiskLevel::Low, 100.0);
        store.upsert_hotspot(&stale).await.unwrap();
        store.upsert_hotspot(&fresh).await.unwrap();

        let hits = index
            .query(CENTER, 500.0, EntityKind::Hotspot, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.id(), fresh.id);
    }

    #[tokio::test]
    async fn test_live_users_share_the_session_table() {
        let (index, _) = index();
        index
            .upsert_live("near", Position::at(GeoPoint::new(31.2310, 121.4737)))
            .unwrap();
        index
            .upsert_live("far", Position::at(GeoPoint::new(31.3000, 121.4737)))
            .unwrap();

        let hits = index
            .query(CENTER, 1_000.0, EntityKind::LiveUser, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.id(), "near");
        assert!(index.live_table().get("far").is_some());

        index.remove_live("near");
        let hits = index
            .query(CENTER, 1_000.0, EntityKind::LiveUser, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_center_is_rejected() {
        let (index, _) = index();
        let result = index
            .query(GeoPoint::new(91.0, 0.0), 100.0, EntityKind::Hotspot, None)
            .await;
        assert!(matches!(result, Err(RunsafeError::InvalidCoordinate(_))));

        let result = index
            .query_or_fallback(GeoPoint::new(f64::NAN, 0.0), 100.0, EntityKind::Hotspot, None)
            .await;
        assert!(matches!(result, Err(RunsafeError::InvalidCoordinate(_))));
    }

    #[tokio::test]
    async fn test_large_hotspot_contains_distant_point() {
        let (index, _) = index();
        let wide = RiskHotspot::reported(CENTER, HotspotType::Crime, RiskLevel::High, 3_000.0);
        let small = RiskHotspot::reported(
            GeoPoint::new(31.2475, 121.4737),
            HotspotType::Lighting,
            RiskLevel::Low,
            100.0,
        );
        index.report_hotspot(&wide).await.unwrap();
        index.report_hotspot(&small).await.unwrap();

        // About 1.5 km north of the wide zone's centre, 0.4 km from the small one
        let point = GeoPoint::new(31.2439, 121.4737);
        let inside = index.hotspots_containing(point).await.unwrap();
        let ids: Vec<&str> = inside.results.iter().map(|h| h.entity.id()).collect();
        assert_eq!(ids, vec![wide.id.as_str()]);
        assert!(inside.results[0].distance_meters > 1_400.0);
    }

    #[tokio::test]
    async fn test_oversized_hotspot_rejected() {
        let (index, store) = index();
        let huge = RiskHotspot::reported(
            CENTER,
            HotspotType::Crime,
            RiskLevel::High,
            MAX_HOTSPOT_RADIUS_M + 1.0,
        );
        let result = index.report_hotspot(&huge).await;
        assert!(matches!(result, Err(RunsafeError::BadRequest(_))));
        assert!(store
            .near(CENTER, 1_000.0, EntityKind::Hotspot)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_fallback_under_store_outage() {
        let (index, store) = index();
        store.set_available(false);

        let contacts = index
            .query_or_fallback(CENTER, 5_000.0, EntityKind::EmergencyContact, None)
            .await
            .unwrap();
        assert!(contacts.degraded);
        assert_eq!(contacts.results.len(), 3);

        let hotspots = index
            .query_or_fallback(CENTER, 500.0, EntityKind::Hotspot, None)
            .await
            .unwrap();
        assert!(hotspots.degraded);
        assert!(hotspots.results.is_empty());

        // Live users never touch the store
        let live = index
            .query_or_fallback(CENTER, 500.0, EntityKind::LiveUser, None)
            .await
            .unwrap();
        assert!(!live.degraded);
    }
}
