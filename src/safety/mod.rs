//! Safety scoring
//!
//! Scores a location at a time of day on a 0-100 scale:
//!
//! 1. base score: `75 × timeMultiplier × (1 − locationRisk/100)`
//! 2. five risk factors (lighting, crowd density, crime rate, traffic safety,
//!    weather), each 0-100
//! 3. weighted overall score, with the configured female-profile adjustment
//! 4. safety band and fixed-order recommendations
//!
//! Routes aggregate the per-waypoint base scores. Hotspots come from the
//! proximity index; when the store is down the score is still returned with
//! `degraded` set.

mod policy;
mod recommendations;
mod score;
mod scorer;

pub use policy::{
    hotspot_risk_points, FactorWeights, SafetyLevel, SafetyThresholds, ScoringPolicy,
    SignalDefaults, TimeSlot, BASE_SCORE, MAX_LOCATION_RISK,
};
pub use recommendations::recommendations;
pub use score::{
    base_score, base_score_raw, location_risk_from_hotspots, overall_score, risk_factors,
    route_score,
};
pub use scorer::{AssessmentInput, RouteInput, SafetyScorer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::geo::GeoPoint;
use crate::proximity::RiskHotspot;
use crate::types::RunsafeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl FromStr for ExperienceLevel {
    type Err = RunsafeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(RunsafeError::InvalidEnum(format!("experience level '{}'", other))),
        }
    }
}

/// Profile attributes the scorer and the recommendation rules read
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunnerProfile {
    pub female: bool,
    pub experience: ExperienceLevel,
}

/// Externally sourced sub-scores; missing ones fall back to neutral defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSignals {
    #[serde(default)]
    pub crowd_density: Option<f64>,
    #[serde(default)]
    pub crime_rate: Option<f64>,
    #[serde(default)]
    pub traffic_safety: Option<f64>,
    #[serde(default)]
    pub weather_conditions: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    pub lighting: f64,
    pub crowd_density: f64,
    pub crime_rate: f64,
    pub traffic_safety: f64,
    pub weather_conditions: f64,
}

impl RiskFactors {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.lighting,
            self.crowd_density,
            self.crime_rate,
            self.traffic_safety,
            self.weather_conditions,
        ]
    }
}

/// Result of scoring one point; never persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAssessment {
    pub overall_score: u8,
    pub base_score: u8,
    pub safety_level: SafetyLevel,
    pub time_slot: TimeSlot,
    pub location_risk: f64,
    pub risk_factors: RiskFactors,
    pub hotspots: Vec<RiskHotspot>,
    pub recommendations: Vec<String>,
    /// Hotspot data was unavailable; the score assumes none
    pub degraded: bool,
}

/// Assessment at the current moment plus live surroundings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeScore {
    #[serde(flatten)]
    pub assessment: SafetyAssessment,
    /// Other live runners within the configured radius
    pub nearby_runners: usize,
    /// Active hotspots whose radius contains the point
    pub inside_hotspots: Vec<RiskHotspot>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDifficulty {
    Easy,
    Medium,
    Hard,
}

impl RouteDifficulty {
    /// Under 3 km easy, under 8 km medium, otherwise hard
    pub fn from_distance(distance_m: f64) -> Self {
        if distance_m < 3_000.0 {
            Self::Easy
        } else if distance_m < 8_000.0 {
            Self::Medium
        } else {
            Self::Hard
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointScore {
    pub point: GeoPoint,
    pub base_score: u8,
    pub hotspot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAnalysis {
    pub safety_score: u8,
    pub safety_level: SafetyLevel,
    pub time_slot: TimeSlot,
    pub distance_meters: f64,
    pub difficulty: RouteDifficulty,
    pub waypoints: Vec<WaypointScore>,
    /// Distinct hotspots near any waypoint
    pub hotspots: Vec<RiskHotspot>,
    pub recommendations: Vec<String>,
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_from_distance() {
        assert_eq!(RouteDifficulty::from_distance(2_999.0), RouteDifficulty::Easy);
        assert_eq!(RouteDifficulty::from_distance(3_000.0), RouteDifficulty::Medium);
        assert_eq!(RouteDifficulty::from_distance(7_999.0), RouteDifficulty::Medium);
        assert_eq!(RouteDifficulty::from_distance(8_000.0), RouteDifficulty::Hard);
    }

    #[test]
    fn test_signals_parse_partial_body() {
        let signals: ExternalSignals = serde_json::from_str(r#"{"crimeRate": 40}"#).unwrap();
        assert_eq!(signals.crime_rate, Some(40.0));
        assert!(signals.crowd_density.is_none());
    }
}
