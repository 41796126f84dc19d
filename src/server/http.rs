//! HTTP server implementation
//!
//! hyper http1 over TokioIo, with upgrades enabled for the realtime channel.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::routes::{self, emergency, error_response, not_found_response, preflight_response, safety};
use crate::server::{websocket, AppState};
use crate::types::{RunsafeError, Result};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest request body accepted by the REST routes
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Runsafe listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    if state.args.dev_mode {
        warn!("Development mode enabled - readiness ignores backend health");
    }
    info!(
        "Realtime channel at /ws (max {} sessions, area alert radius {} m)",
        state.args.max_live_sessions, state.args.area_alert_radius_m
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    debug!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(to_boxed(preflight_response()));
    }
    if method == Method::GET && path == "/ws" {
        return Ok(to_boxed(websocket::handle_ws_upgrade(state, req).await));
    }

    let response = match (&method, path.as_str()) {
        // Liveness probe
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - 200 once the backends answer
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state)).await
        }

        (&Method::GET, "/version") => routes::version_info(),

        (&Method::GET, "/emergency/history") => {
            emergency::history(Arc::clone(&state), query.as_deref()).await
        }

        (&Method::GET, p) if p.starts_with("/emergency/report/") => match emergency::report_path(p) {
            Some((id, false)) => emergency::get_report(Arc::clone(&state), id).await,
            _ => not_found_response(p),
        },

        (&Method::POST, _) | (&Method::PUT, _) | (&Method::DELETE, _) => {
            let body = match read_body(req).await {
                Ok(body) => body,
                Err(e) => return Ok(to_boxed(error_response(e))),
            };
            route_with_body(Arc::clone(&state), &method, &path, query.as_deref(), body).await
        }

        _ => not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Routes that carry a request body
async fn route_with_body(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::POST, "/emergency/report") => emergency::create_report(state, body).await,
        (&Method::POST, "/emergency/sos") => emergency::sos(state, body).await,
        (&Method::POST, "/safety/assessment") => safety::assessment(state, body).await,
        (&Method::POST, "/safety/realtime-score") => safety::realtime_score(state, body).await,
        (&Method::POST, "/safety/route-analysis") => safety::route_analysis(state, body).await,
        (&Method::POST, "/safety/risk-hotspots") => safety::risk_hotspots(state, body).await,
        (&Method::POST, "/safety/hotspots") => safety::report_hotspot(state, body).await,
        (&Method::PUT, p) => match emergency::report_path(p) {
            Some((id, true)) => emergency::update_status(state, id, body).await,
            _ => not_found_response(p),
        },
        (&Method::DELETE, p) => match emergency::report_path(p) {
            Some((id, false)) => emergency::cancel_report(state, id, query, body).await,
            _ => not_found_response(p),
        },
        _ => not_found_response(path),
    }
}

/// Collect a request body, refusing anything over [`MAX_BODY_BYTES`]
async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            warn!("Request body error: {}", e);
            Err(RunsafeError::BadRequest(format!(
                "failed to read request body: {}",
                e
            )))
        }
    }
}

/// Convert `Full<Bytes>` response to `BoxBody` response
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
