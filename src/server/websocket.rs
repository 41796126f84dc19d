//! Realtime WebSocket sessions
//!
//! Connect: `ws://host:8080/ws?userId=<id>`
//!
//! One session per user; a reconnect replaces the previous session. Frames
//! are described in [`crate::realtime`]. Outbound frames are queued per
//! session and written by the connection task, so a slow client never blocks
//! a broadcast. Emergency alerts run in their own task; location updates are
//! applied inline and stay in arrival order.

use bytes::Bytes;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use serde::Deserialize;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::emergency::{EmergencyType, ReportRequest, Severity};
use crate::geo::{GeoPoint, Position};
use crate::realtime::{ClientEvent, EmergencyAlert, ServerEvent};
use crate::routes::{error_response, parse_query};
use crate::server::AppState;
use crate::types::{Result, RunsafeError};

type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    #[serde(default)]
    user_id: Option<String>,
}

/// The connecting user, taken from the `userId` query parameter
fn session_user(query: Option<&str>) -> Result<String> {
    let handshake: Handshake = parse_query(query)?;
    match handshake.user_id {
        Some(user) if !user.trim().is_empty() => Ok(user),
        _ => Err(RunsafeError::BadRequest("userId query parameter is required".into())),
    }
}

/// Handle GET /ws
pub async fn handle_ws_upgrade(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(RunsafeError::BadRequest("WebSocket upgrade required".into()));
    }
    let user_id = match session_user(req.uri().query()) {
        Ok(user) => user,
        Err(e) => return error_response(e),
    };

    // Claim the session before upgrading so a full table is refused with 503
    let (session_id, outbound) = match state.broadcaster.connect(&user_id) {
        Ok(session) => session,
        Err(e) => return error_response(e),
    };

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            error!(user_id = %user_id, error = %e, "WebSocket upgrade failed");
            state.broadcaster.disconnect(&user_id, session_id);
            return error_response(RunsafeError::BadRequest(format!(
                "WebSocket upgrade failed: {}",
                e
            )));
        }
    };

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                info!(user_id = %user_id, session_id = %session_id, "Realtime session opened");
                run_session(&state, ws, &user_id, session_id, outbound).await;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket connection failed");
            }
        }
        state.broadcaster.disconnect(&user_id, session_id);
        info!(user_id = %user_id, session_id = %session_id, "Realtime session closed");
    });

    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

async fn run_session(
    state: &Arc<AppState>,
    ws: HyperWebSocket,
    user_id: &str,
    session_id: Uuid,
    mut outbound: tokio::sync::mpsc::Receiver<ServerEvent>,
) {
    let (mut sender, mut receiver) = ws.split();

    loop {
        tokio::select! {
            event = outbound.recv() => {
                // None once a reconnect has replaced this session
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize realtime frame");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(json)).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_frame(state, user_id, &text).await;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(user_id = %user_id, session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Apply one client frame; failures are reported back as `error` frames.
///
/// An `emergency:alert` is validated here and then raised in a spawned task,
/// so its confirmation may arrive after this returns.
pub async fn handle_client_frame(state: &Arc<AppState>, user_id: &str, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(user_id = %user_id, error = %e, "Unparseable client frame");
            state
                .broadcaster
                .send_error(user_id, format!("unrecognized frame: {}", e));
            return;
        }
    };

    let result = match event {
        ClientEvent::LocationUpdate(update) => state
            .broadcaster
            .position_update(user_id, update)
            .await
            .map(|_| ()),
        ClientEvent::EmergencyAlert(alert) => alert_request(user_id, alert).map(|request| {
            let state = Arc::clone(state);
            let user_id = user_id.to_string();
            tokio::spawn(async move { raise_alert(&state, &user_id, request).await });
        }),
        ClientEvent::Ping => {
            state
                .broadcaster
                .send_to(user_id, ServerEvent::Pong { timestamp: Utc::now() });
            Ok(())
        }
    };

    if let Err(e) = result {
        state.broadcaster.send_error(user_id, e.to_string());
    }
}

fn alert_request(user_id: &str, alert: EmergencyAlert) -> Result<ReportRequest> {
    Ok(ReportRequest {
        user_id: user_id.to_string(),
        emergency_type: alert.emergency_type.parse::<EmergencyType>()?,
        severity: alert.severity.parse::<Severity>()?,
        location: Position::at(GeoPoint::new_checked(alert.lat, alert.lng)?),
        description: alert.description,
    })
}

async fn raise_alert(state: &AppState, user_id: &str, request: ReportRequest) {
    match state.workflow.report(request).await {
        Ok(receipt) => state.broadcaster.confirm(user_id, &receipt),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Emergency alert failed");
            state.broadcaster.send_error(user_id, e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::emergency::DeliveryStatus;
    use crate::notify::{EmergencyNotice, NotificationTarget, Notifier};
    use crate::store::MemoryStore;
    use clap::Parser;
    use std::time::Duration;
    use tokio::sync::mpsc::Receiver;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(Args::parse_from(["runsafe", "--dev-mode"])))
    }

    /// Next frame, waiting for spawned work
    async fn next_frame(rx: &mut Receiver<ServerEvent>) -> ServerEvent {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(event)) => event,
            other => panic!("no frame: {:?}", other),
        }
    }

    const SOS_FRAME: &str = r#"{"event":"emergency:alert","data":{"lat":31.2304,"lng":121.4737}}"#;

    #[test]
    fn test_session_user_requires_user_id() {
        assert_eq!(session_user(Some("userId=u1")).unwrap(), "u1");
        assert!(session_user(None).is_err());
        assert!(session_user(Some("userId=")).is_err());
    }

    #[tokio::test]
    async fn test_ping_answers_pong() {
        let state = state();
        let (_, mut rx) = state.broadcaster.connect("u1").unwrap();

        handle_client_frame(&state, "u1", r#"{"event":"ping"}"#).await;
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Pong { .. })));
    }

    #[tokio::test]
    async fn test_bad_frame_answers_error() {
        let state = state();
        let (_, mut rx) = state.broadcaster.connect("u1").unwrap();

        handle_client_frame(&state, "u1", "not json").await;
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Error { .. })));

        handle_client_frame(
            &state,
            "u1",
            r#"{"event":"location:update","data":{"lat":95.0,"lng":0.0}}"#,
        )
        .await;
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_alert_confirms_to_reporter_and_alerts_others() {
        let state = state();
        let (_, mut reporter) = state.broadcaster.connect("u1").unwrap();
        let (_, mut other) = state.broadcaster.connect("u2").unwrap();

        handle_client_frame(&state, "u1", SOS_FRAME).await;

        assert!(matches!(
            next_frame(&mut reporter).await,
            ServerEvent::EmergencyReceived { .. }
        ));
        match next_frame(&mut reporter).await {
            ServerEvent::EmergencyConfirmed {
                estimated_response_time,
                ..
            } => assert_eq!(estimated_response_time, 150),
            other => panic!("expected confirmation, got {:?}", other),
        }
        assert!(matches!(
            next_frame(&mut other).await,
            ServerEvent::EmergencyReceived { .. }
        ));
    }

    struct SlowNotifier;

    #[async_trait::async_trait]
    impl Notifier for SlowNotifier {
        async fn notify(
            &self,
            _: &str,
            _: &NotificationTarget,
            _: &EmergencyNotice,
        ) -> Result<DeliveryStatus> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(DeliveryStatus::Delivered)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_slow_alert_does_not_hold_up_the_session() {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::with_stores(
            Args::parse_from(["runsafe", "--dev-mode"]),
            store.clone(),
            store,
            Arc::new(SlowNotifier),
        ));
        let (_, mut reporter) = state.broadcaster.connect("u1").unwrap();

        let started = std::time::Instant::now();
        handle_client_frame(&state, "u1", SOS_FRAME).await;
        handle_client_frame(&state, "u1", r#"{"event":"ping"}"#).await;
        assert!(started.elapsed() < Duration::from_millis(200));

        // The ping is answered while the report is still notifying responders
        assert!(matches!(reporter.try_recv(), Ok(ServerEvent::Pong { .. })));

        let mut confirmed = false;
        while !confirmed {
            confirmed = matches!(
                next_frame(&mut reporter).await,
                ServerEvent::EmergencyConfirmed { .. }
            );
        }
    }

    #[tokio::test]
    async fn test_alert_with_unknown_type_is_rejected() {
        let state = state();
        let (_, mut rx) = state.broadcaster.connect("u1").unwrap();

        handle_client_frame(
            &state,
            "u1",
            r#"{"event":"emergency:alert","data":{"type":"fire","lat":31.2,"lng":121.4}}"#,
        )
        .await;
        match rx.try_recv() {
            Ok(ServerEvent::Error { message }) => assert!(message.contains("fire")),
            other => panic!("expected error frame, got {:?}", other),
        }
    }
}
