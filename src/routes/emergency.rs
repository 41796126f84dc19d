//! Emergency endpoints
//!
//! - POST /emergency/report
//! - GET /emergency/report/:id
//! - PUT /emergency/report/:id/status
//! - DELETE /emergency/report/:id
//! - POST /emergency/sos
//! - GET /emergency/history?userId=&limit=&offset=
//!
//! Enum fields arrive as strings and are parsed here so unknown values
//! surface as `InvalidEnum` rather than a generic body error.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use super::{parse_body, parse_query, respond};
use crate::emergency::{EmergencyType, ReportRequest, ReportStatus, Severity};
use crate::geo::{GeoPoint, Position};
use crate::server::AppState;
use crate::types::{Result, RunsafeError};

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Location as sent by clients; capture time defaults to receipt
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBody {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl LocationBody {
    pub fn into_position(self) -> Result<Position> {
        GeoPoint::new_checked(self.lat, self.lng)?;
        Ok(Position {
            lat: self.lat,
            lng: self.lng,
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
            accuracy: self.accuracy,
            speed: self.speed,
            heading: self.heading,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub user_id: String,
    #[serde(rename = "type")]
    pub emergency_type: String,
    pub severity: String,
    pub location: LocationBody,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReportBody {
    pub fn into_request(self) -> Result<ReportRequest> {
        Ok(ReportRequest {
            emergency_type: self.emergency_type.parse::<EmergencyType>()?,
            severity: self.severity.parse::<Severity>()?,
            location: self.location.into_position()?,
            user_id: self.user_id,
            description: self.description,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelParams {
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosBody {
    pub user_id: String,
    pub location: LocationBody,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub user_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Split `/emergency/report/:id[/status]` into the id and whether it ends in `/status`
pub fn report_path(path: &str) -> Option<(&str, bool)> {
    let rest = path.strip_prefix("/emergency/report/")?;
    let (id, status) = match rest.strip_suffix("/status") {
        Some(id) => (id, true),
        None => (rest, false),
    };
    (!id.is_empty() && !id.contains('/')).then_some((id, status))
}

/// POST /emergency/report
pub async fn create_report(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let request = parse_body::<ReportBody>(&body)?.into_request()?;
        state.workflow.report(request).await
    }
    .await;
    respond(result, StatusCode::CREATED)
}

/// GET /emergency/report/:id
pub async fn get_report(state: Arc<AppState>, report_id: &str) -> Response<Full<Bytes>> {
    respond(state.workflow.get(report_id).await, StatusCode::OK)
}

/// PUT /emergency/report/:id/status
pub async fn update_status(
    state: Arc<AppState>,
    report_id: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let result = async {
        let body = parse_body::<StatusBody>(&body)?;
        let status = body.status.parse::<ReportStatus>()?;
        state
            .workflow
            .update_status(report_id, status, body.notes)
            .await
    }
    .await;
    respond(result, StatusCode::OK)
}

/// DELETE /emergency/report/:id
///
/// The owner comes from the body, or from the query string when the body is empty.
pub async fn cancel_report(
    state: Arc<AppState>,
    report_id: &str,
    query: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let result = async {
        let params: CancelParams = if body.is_empty() {
            parse_query(query)?
        } else {
            parse_body(&body)?
        };
        if params.user_id.trim().is_empty() {
            return Err(RunsafeError::BadRequest("userId is required".into()));
        }
        state
            .workflow
            .cancel(report_id, &params.user_id, params.reason)
            .await
    }
    .await;
    respond(result, StatusCode::OK)
}

/// POST /emergency/sos
pub async fn sos(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let body = parse_body::<SosBody>(&body)?;
        let location = body.location.into_position()?;
        state.workflow.sos(&body.user_id, location, body.message).await
    }
    .await;
    respond(result, StatusCode::CREATED)
}

/// GET /emergency/history
pub async fn history(state: Arc<AppState>, query: Option<&str>) -> Response<Full<Bytes>> {
    let result = async {
        let params: HistoryParams = parse_query(query)?;
        state
            .workflow
            .history(
                &params.user_id,
                params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
                params.offset.unwrap_or(0),
            )
            .await
    }
    .await;
    respond(result, StatusCode::OK)
}
