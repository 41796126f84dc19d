//! End-to-end flows over the in-memory engine

use chrono::{Duration, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use runsafe::emergency::{EmergencyType, ReportRequest, ReportStatus, ServiceType, Severity};
use runsafe::geo::{GeoPoint, Position};
use runsafe::notify::LogNotifier;
use runsafe::proximity::{
    ContactType, EmergencyContact, EntityKind, HotspotType, PersonalContact, RiskHotspot,
    RiskLevel,
};
use runsafe::realtime::{LocationUpdate, ServerEvent};
use runsafe::store::MemoryStore;
use runsafe::{AppState, Args, RunsafeError};

const PEOPLE_SQUARE: GeoPoint = GeoPoint::new(31.2304, 121.4737);

fn app() -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::with_stores(
        Args::parse_from(["runsafe", "--dev-mode"]),
        store.clone(),
        store.clone(),
        Arc::new(LogNotifier),
    );
    (state, store)
}

fn sos_request(user_id: &str) -> ReportRequest {
    ReportRequest {
        user_id: user_id.to_string(),
        emergency_type: EmergencyType::Sos,
        severity: Severity::Critical,
        location: Position::at(PEOPLE_SQUARE),
        description: Some("followed by a stranger".into()),
    }
}

#[tokio::test]
async fn sos_report_notifies_police_and_contacts() {
    let (state, store) = app();
    store
        .insert_emergency_contact(EmergencyContact {
            id: "station-1".into(),
            name: "Huangpu Police Station".into(),
            phone: "110".into(),
            contact_type: ContactType::Police,
            lat: 31.2320,
            lng: 121.4750,
        })
        .await;
    store
        .insert_personal_contact(PersonalContact {
            id: "mum".into(),
            user_id: "u1".into(),
            name: "Mum".into(),
            phone: "13800000000".into(),
            relationship: Some("mother".into()),
            notify_on_emergency: true,
            location: None,
        })
        .await;

    let receipt = state.workflow.report(sos_request("u1")).await.unwrap();

    assert_eq!(receipt.status, ReportStatus::Received);
    assert_eq!(receipt.estimated_response_time, 150);
    assert!(receipt.instructions.iter().any(|i| i.contains("Stay calm")));
    assert!(receipt
        .notifications
        .iter()
        .any(|n| n.service_type == Some(ServiceType::Police)));
    // Personal contact plus medical and police services
    assert_eq!(receipt.notifications.len(), 3);
    assert_eq!(receipt.assigned_contacts.len(), 1);
}

#[tokio::test]
async fn non_owner_cannot_cancel() {
    let (state, _) = app();
    let receipt = state.workflow.report(sos_request("u1")).await.unwrap();

    let err = assert_err!(state.workflow.cancel(&receipt.report_id, "u2", None).await);
    assert!(matches!(err, RunsafeError::Unauthorized(_)));

    let details = state.workflow.get(&receipt.report_id).await.unwrap();
    assert_eq!(details.report.status, ReportStatus::Received);
    assert_eq!(details.updates.len(), 1);
}

#[tokio::test]
async fn report_lifecycle_to_resolution() {
    let (state, _) = app();
    let receipt = state.workflow.report(sos_request("u1")).await.unwrap();
    let id = receipt.report_id;

    assert_ok!(
        state
            .workflow
            .update_status(&id, ReportStatus::Processing, Some("officer dispatched".into()))
            .await
    );
    assert_ok!(
        state
            .workflow
            .update_status(&id, ReportStatus::Resolved, None)
            .await
    );

    let err = assert_err!(state.workflow.cancel(&id, "u1", None).await);
    assert!(matches!(err, RunsafeError::InvalidTransition { .. }));

    let details = state.workflow.get(&id).await.unwrap();
    assert_eq!(details.report.status, ReportStatus::Resolved);
    let sequences: Vec<u32> = details.updates.iter().map(|u| u.sequence).collect();
    assert_eq!(sequences, vec![0, 1]);

    let history = state.workflow.history("u1", 10, 0).await.unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.reports[0].id, id);
}

#[tokio::test]
async fn stale_unverified_hotspots_drop_out() {
    let (state, _) = app();
    let now = Utc::now();

    let mut stale = RiskHotspot::reported(PEOPLE_SQUARE, HotspotType::Crime, RiskLevel::High, 200.0);
    stale.reported_at = now - Duration::days(8);
    let mut verified =
        RiskHotspot::reported(PEOPLE_SQUARE, HotspotType::Lighting, RiskLevel::Low, 200.0);
    verified.reported_at = now - Duration::days(400);
    verified.verified_at = Some(now - Duration::days(399));

    state.index.report_hotspot(&stale).await.unwrap();
    state.index.report_hotspot(&verified).await.unwrap();

    let hits = state
        .index
        .query_at(PEOPLE_SQUARE, 1_000.0, EntityKind::Hotspot, None, now)
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.entity.id()).collect();
    assert_eq!(ids, vec![verified.id.as_str()]);
}

#[tokio::test]
async fn report_alerts_runners_in_the_area() {
    let (state, _) = app();
    let (_, mut reporter) = state.broadcaster.connect("u1").unwrap();
    let (_, mut nearby) = state.broadcaster.connect("u2").unwrap();

    state
        .broadcaster
        .position_update(
            "u2",
            LocationUpdate {
                lat: 31.2310,
                lng: 121.4740,
                accuracy: None,
                speed: None,
                heading: None,
                timestamp: None,
            },
        )
        .await
        .unwrap();

    state.workflow.report(sos_request("u1")).await.unwrap();

    // The reporter saw u2 move and the broadcast, but no area alert about itself
    assert!(matches!(
        reporter.try_recv(),
        Ok(ServerEvent::LocationUpdated { .. })
    ));
    assert!(matches!(
        reporter.try_recv(),
        Ok(ServerEvent::EmergencyReceived { .. })
    ));
    assert!(reporter.try_recv().is_err());

    assert!(matches!(
        nearby.try_recv(),
        Ok(ServerEvent::EmergencyReceived { .. })
    ));
    assert!(matches!(nearby.try_recv(), Ok(ServerEvent::AreaAlert { .. })));
}
