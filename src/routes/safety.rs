//! Safety endpoints
//!
//! - POST /safety/assessment
//! - POST /safety/realtime-score
//! - POST /safety/route-analysis
//! - POST /safety/risk-hotspots (hotspots near a point)
//! - POST /safety/hotspots (report a hotspot)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{parse_body, respond, LatLng};
use crate::proximity::{
    EntityKind, HotspotType, Nearby, RiskHotspot, RiskLevel, MAX_HOTSPOT_RADIUS_M,
};
use crate::safety::{AssessmentInput, ExperienceLevel, ExternalSignals, RouteInput, RunnerProfile};
use crate::server::AppState;
use crate::types::{Result, RunsafeError};

const DEFAULT_HOTSPOT_RADIUS_M: f64 = 1_000.0;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBody {
    #[serde(default)]
    pub female: bool,
    #[serde(default)]
    pub experience: Option<String>,
}

impl ProfileBody {
    fn into_profile(self) -> Result<RunnerProfile> {
        Ok(RunnerProfile {
            female: self.female,
            experience: match self.experience {
                Some(level) => level.parse::<ExperienceLevel>()?,
                None => ExperienceLevel::default(),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentBody {
    pub location: LatLng,
    /// Local hour 0-23 at the runner
    #[serde(default)]
    pub hour: Option<u32>,
    #[serde(default)]
    pub profile: ProfileBody,
    #[serde(default)]
    pub signals: ExternalSignals,
    #[serde(default)]
    pub location_risk: Option<f64>,
    /// Excluded from the nearby-runner count of a realtime score
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AssessmentBody {
    fn into_input(self) -> Result<(AssessmentInput, Option<String>)> {
        let input = AssessmentInput {
            point: self.location.checked()?,
            hour: self.hour,
            profile: self.profile.into_profile()?,
            signals: self.signals,
            location_risk: self.location_risk,
        };
        Ok((input, self.user_id))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBody {
    pub waypoints: Vec<LatLng>,
    #[serde(default)]
    pub hour: Option<u32>,
    #[serde(default)]
    pub profile: ProfileBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotQueryBody {
    pub location: LatLng,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotQueryResponse {
    pub hotspots: Vec<Nearby>,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotReportBody {
    pub location: LatLng,
    #[serde(rename = "type")]
    pub hotspot_type: String,
    pub level: String,
    pub radius_meters: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// POST /safety/assessment
pub async fn assessment(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let (input, _) = parse_body::<AssessmentBody>(&body)?.into_input()?;
        state.scorer.assess(&input).await
    }
    .await;
    respond(result, StatusCode::OK)
}

/// POST /safety/realtime-score
pub async fn realtime_score(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let (input, user_id) = parse_body::<AssessmentBody>(&body)?.into_input()?;
        state
            .scorer
            .realtime_score(&input, user_id.as_deref())
            .await
    }
    .await;
    respond(result, StatusCode::OK)
}

/// POST /safety/route-analysis
pub async fn route_analysis(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let body = parse_body::<RouteBody>(&body)?;
        let waypoints = body
            .waypoints
            .into_iter()
            .map(LatLng::checked)
            .collect::<Result<Vec<_>>>()?;
        let input = RouteInput {
            waypoints,
            hour: body.hour,
            profile: body.profile.into_profile()?,
        };
        state.scorer.analyze_route(&input).await
    }
    .await;
    respond(result, StatusCode::OK)
}

/// POST /safety/risk-hotspots
pub async fn risk_hotspots(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let body = parse_body::<HotspotQueryBody>(&body)?;
        let radius = body.radius_meters.unwrap_or(DEFAULT_HOTSPOT_RADIUS_M);
        if radius > MAX_HOTSPOT_RADIUS_M {
            return Err(RunsafeError::BadRequest(format!(
                "radiusMeters may not exceed {}",
                MAX_HOTSPOT_RADIUS_M
            )));
        }
        let outcome = state
            .index
            .query_or_fallback(body.location.checked()?, radius, EntityKind::Hotspot, body.limit)
            .await?;
        Ok(HotspotQueryResponse {
            hotspots: outcome.results,
            degraded: outcome.degraded,
        })
    }
    .await;
    respond(result, StatusCode::OK)
}

/// POST /safety/hotspots
pub async fn report_hotspot(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let result = async {
        let body = parse_body::<HotspotReportBody>(&body)?;
        let mut hotspot = RiskHotspot::reported(
            body.location.checked()?,
            body.hotspot_type.parse::<HotspotType>()?,
            body.level.parse::<RiskLevel>()?,
            body.radius_meters,
        );
        hotspot.description = body.description;
        state.index.report_hotspot(&hotspot).await?;
        Ok(hotspot)
    }
    .await;
    respond(result, StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use clap::Parser;
    use http_body_util::BodyExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(Args::parse_from(["runsafe", "--dev-mode"])))
    }

    async fn call(
        handler: impl std::future::Future<Output = Response<Full<Bytes>>>,
    ) -> (StatusCode, serde_json::Value) {
        let response = handler.await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json(value: serde_json::Value) -> Bytes {
        Bytes::from(value.to_string())
    }

    #[tokio::test]
    async fn test_assessment_scenario_night() {
        let (status, body) = call(assessment(
            state(),
            json(serde_json::json!({
                "location": { "lat": 31.2304, "lng": 121.4737 },
                "hour": 23,
                "locationRisk": 0
            })),
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["baseScore"], 52);
        assert_eq!(body["timeSlot"], "night");
    }

    #[tokio::test]
    async fn test_assessment_rejects_bad_input() {
        let (status, body) = call(assessment(
            state(),
            json(serde_json::json!({ "location": { "lat": 91.0, "lng": 0.0 } })),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_coordinate");

        let (status, body) = call(assessment(
            state(),
            json(serde_json::json!({
                "location": { "lat": 31.0, "lng": 121.0 },
                "profile": { "experience": "elite" }
            })),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_enum");
    }

    #[tokio::test]
    async fn test_reported_hotspot_is_queryable() {
        let state = state();
        let (status, reported) = call(report_hotspot(
            state.clone(),
            json(serde_json::json!({
                "location": { "lat": 31.2304, "lng": 121.4737 },
                "type": "lighting",
                "level": "medium",
                "radiusMeters": 150.0,
                "description": "broken street lamps"
            })),
        ))
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(risk_hotspots(
            state,
            json(serde_json::json!({ "location": { "lat": 31.2310, "lng": 121.4740 } })),
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["degraded"], false);
        assert_eq!(body["hotspots"][0]["id"], reported["id"]);
        assert_eq!(body["hotspots"][0]["kind"], "hotspot");
    }

    #[tokio::test]
    async fn test_radius_limit_applies_to_reports_and_queries() {
        let state = state();
        let (status, body) = call(report_hotspot(
            state.clone(),
            json(serde_json::json!({
                "location": { "lat": 31.2304, "lng": 121.4737 },
                "type": "crime",
                "level": "high",
                "radiusMeters": MAX_HOTSPOT_RADIUS_M + 1.0
            })),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let (status, _) = call(risk_hotspots(
            state,
            json(serde_json::json!({
                "location": { "lat": 31.2304, "lng": 121.4737 },
                "radiusMeters": MAX_HOTSPOT_RADIUS_M + 1.0
            })),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_route_analysis() {
        let (status, body) = call(route_analysis(
            state(),
            json(serde_json::json!({
                "waypoints": [
                    { "lat": 31.2304, "lng": 121.4737 },
                    { "lat": 31.2404, "lng": 121.4737 }
                ],
                "hour": 14
            })),
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["safetyScore"], 75);
        assert_eq!(body["difficulty"], "easy");
        assert_eq!(body["waypoints"].as_array().unwrap().len(), 2);
    }
}
