//! Geofence broadcaster
//!
//! Turns position updates and emergencies into outbound frames. Every frame is
//! queued with `try_send` on the recipient's bounded channel: a full or closed
//! queue drops that frame for that recipient only.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{LocationUpdate, ServerEvent};
use crate::emergency::{AreaAlerter, EmergencyReport, ReportReceipt};
use crate::geo::{distance_meters, GeoPoint, Position};
use crate::proximity::{EntityKind, ProximityEntity, ProximityIndex, SessionSender};
use crate::types::Result;

#[derive(Debug, Clone, Copy)]
pub struct BroadcasterConfig {
    /// Live users within this radius of a new emergency get `safety:alert`
    pub area_alert_radius_m: f64,
    /// Capacity of each session's outbound queue
    pub outbound_queue: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            area_alert_radius_m: 1_000.0,
            outbound_queue: 64,
        }
    }
}

pub struct RealtimeBroadcaster {
    index: Arc<ProximityIndex>,
    config: BroadcasterConfig,
}

fn deliver(user_id: &str, sender: &SessionSender, event: ServerEvent) -> bool {
    let name = event.name();
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(user_id, event = name, "Outbound queue full, dropping frame");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(user_id, event = name, "Session closed, dropping frame");
            false
        }
    }
}

impl RealtimeBroadcaster {
    pub fn new(index: Arc<ProximityIndex>, config: BroadcasterConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    /// Register a connection; returns its session id and outbound queue
    pub fn connect(&self, user_id: &str) -> Result<(Uuid, mpsc::Receiver<ServerEvent>)> {
        let (tx, rx) = mpsc::channel(self.config.outbound_queue.max(1));
        let session_id = self.index.live_table().attach(user_id, tx)?;
        info!(user_id, session = %session_id, live = self.index.live_table().len(), "Runner connected");
        Ok((session_id, rx))
    }

    /// Apply a position update.
    ///
    /// Other sessions get `location:updated`; the updating session alone gets
    /// one `safety:zone_warning` per active hotspot containing the position.
    /// Returns the number of zone warnings queued.
    pub async fn position_update(&self, user_id: &str, update: LocationUpdate) -> Result<usize> {
        let position = Position {
            lat: update.lat,
            lng: update.lng,
            captured_at: update.timestamp.unwrap_or_else(Utc::now),
            accuracy: update.accuracy,
            speed: update.speed,
            heading: update.heading,
        };
        self.index.upsert_live(user_id, position.clone())?;

        let live = self.index.live_table();
        for (other, sender) in live.senders_except(user_id) {
            deliver(
                &other,
                &sender,
                ServerEvent::LocationUpdated {
                    user_id: user_id.to_string(),
                    lat: position.lat,
                    lng: position.lng,
                    captured_at: position.captured_at,
                    speed: position.speed,
                    heading: position.heading,
                },
            );
        }

        let Some(own) = live.sender_of(user_id) else {
            return Ok(0);
        };

        let hotspots = self.index.hotspots_containing(position.point()).await?;

        let mut warnings = 0;
        for hit in hotspots.results {
            let ProximityEntity::Hotspot(hotspot) = hit.entity else {
                continue;
            };
            let event = ServerEvent::ZoneWarning {
                message: format!(
                    "You are inside a {} risk {} zone",
                    hotspot.level, hotspot.hotspot_type
                ),
                hotspot_id: hotspot.id,
                hotspot_type: hotspot.hotspot_type,
                level: hotspot.level,
                distance_meters: hit.distance_meters,
                radius_meters: hotspot.radius_meters,
            };
            if deliver(user_id, &own, event) {
                warnings += 1;
            }
        }

        if warnings > 0 {
            debug!(user_id, warnings, "Zone warnings sent");
        }
        Ok(warnings)
    }

    /// Tell the reporter their emergency was recorded
    pub fn confirm(&self, user_id: &str, receipt: &ReportReceipt) {
        if let Some(sender) = self.index.live_table().sender_of(user_id) {
            deliver(
                user_id,
                &sender,
                ServerEvent::EmergencyConfirmed {
                    report_id: receipt.report_id.clone(),
                    status: receipt.status,
                    estimated_response_time: receipt.estimated_response_time,
                    instructions: receipt.instructions.clone(),
                    partial_cascade: receipt.partial_cascade.is_some(),
                },
            );
        }
    }

    /// Queue an `error` frame for one session
    pub fn send_error(&self, user_id: &str, message: impl Into<String>) {
        if let Some(sender) = self.index.live_table().sender_of(user_id) {
            deliver(
                user_id,
                &sender,
                ServerEvent::Error {
                    message: message.into(),
                },
            );
        }
    }

    /// Queue a frame for one session
    pub fn send_to(&self, user_id: &str, event: ServerEvent) -> bool {
        match self.index.live_table().sender_of(user_id) {
            Some(sender) => deliver(user_id, &sender, event),
            None => false,
        }
    }

    /// Drop a closed connection and announce it.
    ///
    /// Does nothing when a newer connection of the same user owns the entry.
    pub fn disconnect(&self, user_id: &str, session_id: Uuid) {
        let live = self.index.live_table();
        if live.detach(user_id, session_id).is_none() {
            debug!(user_id, session = %session_id, "Stale disconnect ignored");
            return;
        }

        let timestamp = Utc::now();
        for (other, sender) in live.senders_except(user_id) {
            deliver(
                &other,
                &sender,
                ServerEvent::UserOffline {
                    user_id: user_id.to_string(),
                    session_id,
                    timestamp,
                },
            );
        }
        info!(user_id, session = %session_id, live = live.len(), "Runner disconnected");
    }
}

#[async_trait::async_trait]
impl AreaAlerter for RealtimeBroadcaster {
    async fn area_alert(&self, report: &EmergencyReport) {
        let live = self.index.live_table();
        let origin = report.location.point();

        let mut received = 0;
        for (other, sender) in live.senders() {
            if deliver(
                &other,
                &sender,
                ServerEvent::EmergencyReceived {
                    report_id: report.id.clone(),
                    user_id: report.user_id.clone(),
                    emergency_type: report.emergency_type,
                    severity: report.severity,
                    lat: origin.lat,
                    lng: origin.lng,
                    created_at: report.created_at,
                },
            ) {
                received += 1;
            }
        }

        let nearby = match self
            .index
            .query(origin, self.config.area_alert_radius_m, EntityKind::LiveUser, None)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(report_id = %report.id, error = %e, "Area alert query failed");
                Vec::new()
            }
        };

        let mut alerted = 0;
        for hit in nearby {
            let ProximityEntity::LiveUser(user) = hit.entity else {
                continue;
            };
            if user.user_id == report.user_id {
                continue;
            }
            let Some(sender) = live.sender_of(&user.user_id) else {
                continue;
            };
            let distance = distance_meters(origin, GeoPoint::new(user.lat, user.lng));
            if deliver(
                &user.user_id,
                &sender,
                ServerEvent::AreaAlert {
                    report_id: report.id.clone(),
                    emergency_type: report.emergency_type,
                    severity: report.severity,
                    lat: origin.lat,
                    lng: origin.lng,
                    distance_meters: distance,
                    message: format!(
                        "{} emergency reported {:.0} m from you",
                        report.emergency_type, distance
                    ),
                },
            ) {
                alerted += 1;
            }
        }

        info!(report_id = %report.id, received, alerted, "Area alert fanned out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emergency::{EmergencyType, ReportStatus};
    use crate::proximity::{HotspotType, LiveSessionTable, RiskHotspot, RiskLevel};
    use crate::store::{MemoryStore, SpatialStore};
    use tokio::sync::mpsc::error::TryRecvError;

    const CENTER: GeoPoint = GeoPoint::new(31.2304, 121.4737);

    fn broadcaster() -> (RealtimeBroadcaster, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(ProximityIndex::new(
            store.clone(),
            Arc::new(LiveSessionTable::new(100)),
        ));
        (
            RealtimeBroadcaster::new(index, BroadcasterConfig::default()),
            store,
        )
    }

    fn update_at(point: GeoPoint) -> LocationUpdate {
        LocationUpdate {
            lat: point.lat,
            lng: point.lng,
            accuracy: None,
            speed: Some(3.0),
            heading: None,
            timestamp: None,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_position_fans_out_to_others_only() {
        let (b, _) = broadcaster();
        let (_, mut rx_a) = b.connect("a").unwrap();
        let (_, mut rx_b) = b.connect("b").unwrap();

        let warnings = b.position_update("a", update_at(CENTER)).await.unwrap();
        assert_eq!(warnings, 0);

        assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Empty)));
        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::LocationUpdated { user_id, speed, .. } => {
                assert_eq!(user_id, "a");
                assert_eq!(*speed, Some(3.0));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zone_warning_only_to_updating_session() {
        let (b, store) = broadcaster();
        store
            .upsert_hotspot(&RiskHotspot::reported(
                CENTER,
                HotspotType::Crime,
                RiskLevel::High,
                200.0,
            ))
            .await
            .unwrap();
        // 500 m away: outside this smaller zone
        store
            .upsert_hotspot(&RiskHotspot::reported(
                GeoPoint::new(31.2349, 121.4737),
                HotspotType::Lighting,
                RiskLevel::Low,
                100.0,
            ))
            .await
            .unwrap();

        let (_, mut rx_a) = b.connect("a").unwrap();
        let (_, mut rx_b) = b.connect("b").unwrap();

        let warnings = b.position_update("a", update_at(CENTER)).await.unwrap();
        assert_eq!(warnings, 1);

        let own = drain(&mut rx_a);
        assert_eq!(own.len(), 1);
        assert!(matches!(
            &own[0],
            ServerEvent::ZoneWarning { level: RiskLevel::High, .. }
        ));
        assert!(drain(&mut rx_b)
            .iter()
            .all(|e| !matches!(e, ServerEvent::ZoneWarning { .. })));
    }

    #[tokio::test]
    async fn test_zone_warning_for_wide_hotspot() {
        let (b, store) = broadcaster();
        store
            .upsert_hotspot(&RiskHotspot::reported(
                CENTER,
                HotspotType::Crime,
                RiskLevel::High,
                3_000.0,
            ))
            .await
            .unwrap();
        let (_, mut rx_a) = b.connect("a").unwrap();

        // About 1.5 km from the centre
        let warnings = b
            .position_update("a", update_at(GeoPoint::new(31.2439, 121.4737)))
            .await
            .unwrap();
        assert_eq!(warnings, 1);
        match &drain(&mut rx_a)[..] {
            [ServerEvent::ZoneWarning {
                distance_meters,
                radius_meters,
                ..
            }] => {
                assert!(*distance_meters > 1_400.0);
                assert_eq!(*radius_meters, 3_000.0);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_position_rejected() {
        let (b, _) = broadcaster();
        let (_, _rx) = b.connect("a").unwrap();
        let result = b.position_update("a", update_at(GeoPoint::new(0.0, 200.0))).await;
        assert!(matches!(
            result,
            Err(crate::types::RunsafeError::InvalidCoordinate(_))
        ));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session_and_stale_disconnect_is_ignored() {
        let (b, _) = broadcaster();
        let (old_session, _old_rx) = b.connect("a").unwrap();
        b.position_update("a", update_at(CENTER)).await.unwrap();
        let (new_session, mut new_rx) = b.connect("a").unwrap();
        let (_, mut rx_b) = b.connect("b").unwrap();

        b.disconnect("a", old_session);
        let live = b.index.live_table();
        assert_eq!(live.get("a").unwrap().session_id, new_session);
        assert!(live.get("a").unwrap().last_position.is_some());
        assert!(drain(&mut rx_b).is_empty());

        b.disconnect("a", new_session);
        assert!(live.get("a").is_none());
        let events = drain(&mut rx_b);
        assert!(matches!(
            &events[..],
            [ServerEvent::UserOffline { user_id, .. }] if user_id == "a"
        ));
        assert!(drain(&mut new_rx).is_empty());
    }

    fn report_at(point: GeoPoint, user_id: &str) -> EmergencyReport {
        let now = Utc::now();
        EmergencyReport {
            id: "r1".into(),
            emergency_type: EmergencyType::Sos,
            location: Position::at(point),
            severity: RiskLevel::Critical,
            user_id: user_id.into(),
            status: ReportStatus::Received,
            description: None,
            estimated_response_time: 150,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_area_alert_reaches_nearby_runners() {
        let (b, _) = broadcaster();
        let (_, mut rx_origin) = b.connect("origin").unwrap();
        let (_, mut rx_near) = b.connect("near").unwrap();
        let (_, mut rx_far) = b.connect("far").unwrap();

        b.position_update("origin", update_at(CENTER)).await.unwrap();
        b.position_update("near", update_at(GeoPoint::new(31.2340, 121.4737)))
            .await
            .unwrap();
        b.position_update("far", update_at(GeoPoint::new(31.3000, 121.4737)))
            .await
            .unwrap();
        drain(&mut rx_origin);
        drain(&mut rx_near);
        drain(&mut rx_far);

        b.area_alert(&report_at(CENTER, "origin")).await;

        // The origin hears the broadcast but gets no area alert about itself
        let origin = drain(&mut rx_origin);
        assert_eq!(origin.len(), 1);
        assert!(matches!(
            &origin[0],
            ServerEvent::EmergencyReceived { user_id, .. } if user_id == "origin"
        ));

        let near = drain(&mut rx_near);
        assert_eq!(near.len(), 2);
        assert_eq!(near[0].name(), "emergency:received");
        match &near[1] {
            ServerEvent::AreaAlert { distance_meters, .. } => {
                assert!(*distance_meters > 350.0 && *distance_meters < 450.0)
            }
            other => panic!("unexpected event {:?}", other),
        }

        let far = drain(&mut rx_far);
        assert_eq!(far.len(), 1);
        assert_eq!(far[0].name(), "emergency:received");
    }

    #[tokio::test]
    async fn test_full_queue_drops_frame() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(ProximityIndex::new(
            store,
            Arc::new(LiveSessionTable::new(100)),
        ));
        let b = RealtimeBroadcaster::new(
            index,
            BroadcasterConfig {
                outbound_queue: 1,
                ..BroadcasterConfig::default()
            },
        );
        let (_, mut rx) = b.connect("a").unwrap();

        assert!(b.send_to("a", ServerEvent::Pong { timestamp: Utc::now() }));
        assert!(!b.send_to("a", ServerEvent::Pong { timestamp: Utc::now() }));
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(!b.send_to("nobody", ServerEvent::Pong { timestamp: Utc::now() }));
    }
}
