//! Health check endpoints
//!
//! - /health, /healthz - Liveness: 200 whenever the process is serving
//! - /ready, /readyz - Readiness: 200 when MongoDB answers a ping and NATS is
//!   connected. Dev mode is always ready; it runs on in-memory fallbacks.
//! - /version - Build information stamped by build.rs

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::json_response;
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHealth {
    /// Whether the backend is configured for this process
    pub configured: bool,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// 'online' or 'degraded'
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since startup
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub node_id: String,
    pub live_sessions: usize,
    pub mongodb: BackendHealth,
    pub nats: BackendHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState, mongo_connected: bool) -> HealthResponse {
    let nats_connected = state.nats.as_ref().is_some_and(|n| n.is_connected());
    let degraded = !mongo_connected || !nats_connected;

    let error = match (mongo_connected, nats_connected) {
        (true, true) => None,
        (false, true) => Some("MongoDB unavailable - serving from fallback data".to_string()),
        (true, false) => Some("NATS unavailable - notifications are logged only".to_string()),
        (false, false) => Some("MongoDB and NATS unavailable".to_string()),
    };

    HealthResponse {
        healthy: true,
        status: if degraded && !state.args.dev_mode {
            "degraded"
        } else {
            "online"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        live_sessions: state.index.live_table().len(),
        mongodb: BackendHealth {
            configured: state.mongo.is_some(),
            connected: mongo_connected,
        },
        nats: BackendHealth {
            configured: state.nats.is_some(),
            connected: nats_connected,
        },
        error,
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = build_health_response(&state, state.mongo.is_some());
    json_response(StatusCode::OK, &response)
}

/// Handle readiness probe (/ready, /readyz)
pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let mongo_connected = match &state.mongo {
        Some(client) => match client.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Readiness ping to MongoDB failed");
                false
            }
        },
        None => false,
    };

    let response = build_health_response(&state, mongo_connected);
    let ready = state.args.dev_mode || (mongo_connected && response.nats.connected);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "runsafe",
    };
    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use clap::Parser;
    use http_body_util::BodyExt;

    fn state(dev_mode: bool) -> Arc<AppState> {
        let mut argv = vec!["runsafe"];
        if dev_mode {
            argv.push("--dev-mode");
        }
        Arc::new(AppState::in_memory(Args::parse_from(argv)))
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let response = health_check(state(false));
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["healthy"], true);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["mongodb"]["configured"], false);
    }

    #[tokio::test]
    async fn test_readiness_depends_on_mode() {
        assert_eq!(
            readiness_check(state(false)).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(readiness_check(state(true)).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_version_info() {
        let json = body_json(version_info()).await;
        assert_eq!(json["service"], "runsafe");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
