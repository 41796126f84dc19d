//! REST route handlers
//!
//! Handlers take the already-read request body (or query string) and return a
//! complete response. Routing and body collection live in `server::http`.

pub mod emergency;
pub mod health;
pub mod safety;

pub use health::{health_check, readiness_check, version_info};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE,
};
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::geo::GeoPoint;
use crate::types::{Result, RunsafeError};

/// Response with a JSON body and permissive CORS
fn with_json(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Serialize `body` as the JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_json(status, Bytes::from(bytes)),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            error_response(RunsafeError::Internal("response serialization failed".into()))
        }
    }
}

/// `{error, message}` body with the error's status
pub fn error_response(err: RunsafeError) -> Response<Full<Bytes>> {
    if err.status_code().is_server_error() {
        warn!(kind = err.kind(), error = %err, "Request failed");
    }
    let (status, body) = err.into_status_code_and_body();
    with_json(status, Bytes::from(body))
}

/// Map a handler result to a response
pub fn respond<T: Serialize>(result: Result<T>, status: StatusCode) -> Response<Full<Bytes>> {
    match result {
        Ok(body) => json_response(status, &body),
        Err(e) => error_response(e),
    }
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(RunsafeError::NotFound(format!("no route for {}", path)))
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response
}

/// Parse a JSON request body
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        return Err(RunsafeError::BadRequest("request body is required".into()));
    }
    serde_json::from_slice(body)
        .map_err(|e| RunsafeError::BadRequest(format!("invalid JSON body: {}", e)))
}

/// Parse a query string; a missing query parses as empty
pub fn parse_query<T: DeserializeOwned>(query: Option<&str>) -> Result<T> {
    serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| RunsafeError::BadRequest(format!("invalid query string: {}", e)))
}

/// `{lat, lng}` as it appears in request bodies
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn checked(self) -> Result<GeoPoint> {
        GeoPoint::new_checked(self.lat, self.lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_error_response_body() {
        let response = error_response(RunsafeError::Unauthorized("not yours".into()));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unauthorized");
    }

    #[test]
    fn test_parse_body_rejects_empty_and_malformed() {
        assert!(matches!(
            parse_body::<LatLng>(b""),
            Err(RunsafeError::BadRequest(_))
        ));
        assert!(matches!(
            parse_body::<LatLng>(b"{\"lat\":"),
            Err(RunsafeError::BadRequest(_))
        ));
        let point = parse_body::<LatLng>(br#"{"lat":31.2,"lng":121.4}"#).unwrap();
        assert_eq!(point.lat, 31.2);
    }

    #[test]
    fn test_parse_query() {
        #[derive(Deserialize)]
        struct Page {
            limit: Option<usize>,
        }
        assert_eq!(parse_query::<Page>(Some("limit=5")).unwrap().limit, Some(5));
        assert_eq!(parse_query::<Page>(None).unwrap().limit, None);
        assert!(parse_query::<Page>(Some("limit=abc")).is_err());
    }
}
