//! Safety scorer service

use chrono::{DateTime, Local, Timelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::policy::{SafetyLevel, ScoringPolicy, TimeSlot};
use super::score::{
    base_score, clamp_location_risk, location_risk_from_hotspots, overall_score, risk_factors,
    route_score,
};
use super::{
    recommendations, ExternalSignals, RealtimeScore, RouteAnalysis, RouteDifficulty,
    RunnerProfile, SafetyAssessment, WaypointScore,
};
use crate::geo::{distance_meters, path_length_meters, GeoPoint};
use crate::proximity::{EntityKind, ProximityEntity, ProximityIndex, QueryOutcome, RiskHotspot};
use crate::types::{Result, RunsafeError};

/// Inputs of a point assessment
#[derive(Debug, Clone)]
pub struct AssessmentInput {
    pub point: GeoPoint,
    /// Local hour at the runner; the server's local hour when absent
    pub hour: Option<u32>,
    pub profile: RunnerProfile,
    pub signals: ExternalSignals,
    /// Overrides the hotspot-derived location risk
    pub location_risk: Option<f64>,
}

impl AssessmentInput {
    pub fn at(point: GeoPoint) -> Self {
        Self {
            point,
            hour: None,
            profile: RunnerProfile::default(),
            signals: ExternalSignals::default(),
            location_risk: None,
        }
    }
}

/// Inputs of a route analysis
#[derive(Debug, Clone)]
pub struct RouteInput {
    pub waypoints: Vec<GeoPoint>,
    pub hour: Option<u32>,
    pub profile: RunnerProfile,
}

pub struct SafetyScorer {
    index: Arc<ProximityIndex>,
    policy: ScoringPolicy,
}

fn slot_for(hour: Option<u32>) -> Result<TimeSlot> {
    TimeSlot::from_hour(hour.unwrap_or_else(|| Local::now().hour()))
}

fn hotspots_of(outcome: QueryOutcome) -> Vec<RiskHotspot> {
    outcome
        .results
        .into_iter()
        .filter_map(|hit| match hit.entity {
            ProximityEntity::Hotspot(hotspot) => Some(hotspot),
            _ => None,
        })
        .collect()
}

impl SafetyScorer {
    pub fn new(index: Arc<ProximityIndex>, policy: ScoringPolicy) -> Self {
        Self { index, policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Active hotspots within `radius_m`, empty and degraded on store outage
    pub async fn hotspots_near(&self, point: GeoPoint, radius_m: f64) -> Result<(Vec<RiskHotspot>, bool)> {
        let outcome = self
            .index
            .query_or_fallback(point, radius_m, EntityKind::Hotspot, None)
            .await?;
        let degraded = outcome.degraded;
        Ok((hotspots_of(outcome), degraded))
    }

    /// Score a single point
    pub async fn assess(&self, input: &AssessmentInput) -> Result<SafetyAssessment> {
        input.point.validate()?;
        if let Some(risk) = input.location_risk {
            if !risk.is_finite() {
                return Err(RunsafeError::BadRequest("locationRisk must be a number".into()));
            }
        }
        let slot = slot_for(input.hour)?;

        let (hotspots, degraded) = self
            .hotspots_near(input.point, self.policy.hotspot_scan_radius_m)
            .await?;
        let location_risk = input
            .location_risk
            .map(clamp_location_risk)
            .unwrap_or_else(|| location_risk_from_hotspots(&hotspots));

        let factors = risk_factors(slot, &input.signals, location_risk, &self.policy.defaults);
        let adjustment = if input.profile.female {
            self.policy.female_adjustment
        } else {
            1.0
        };
        let overall = overall_score(&factors, &self.policy.weights, adjustment);
        let level = SafetyLevel::classify(overall, self.policy.thresholds_for(input.profile.female));

        debug!(
            lat = input.point.lat,
            lng = input.point.lng,
            slot = ?slot,
            overall,
            hotspots = hotspots.len(),
            degraded,
            "Safety assessment"
        );

        Ok(SafetyAssessment {
            overall_score: overall,
            base_score: base_score(slot, location_risk),
            safety_level: level,
            time_slot: slot,
            location_risk,
            risk_factors: factors,
            recommendations: recommendations(slot, &input.profile, &hotspots),
            hotspots,
            degraded,
        })
    }

    /// Assessment now, plus nearby runners and the hotspots containing the point
    pub async fn realtime_score(
        &self,
        input: &AssessmentInput,
        user_id: Option<&str>,
    ) -> Result<RealtimeScore> {
        let mut assessment = self.assess(input).await?;

        let nearby_runners = self
            .index
            .query(
                input.point,
                self.policy.nearby_runner_radius_m,
                EntityKind::LiveUser,
                None,
            )
            .await?
            .iter()
            .filter(|hit| Some(hit.entity.id()) != user_id)
            .count();

        let containing = self.index.hotspots_containing(input.point).await?;
        assessment.degraded |= containing.degraded;
        let inside_hotspots = hotspots_of(containing);

        Ok(RealtimeScore {
            assessment,
            nearby_runners,
            inside_hotspots,
            timestamp: Utc::now(),
        })
    }

    /// Score a route as the mean of its waypoints' base scores
    pub async fn analyze_route(&self, input: &RouteInput) -> Result<RouteAnalysis> {
        if input.waypoints.is_empty() {
            return Err(RunsafeError::BadRequest("route needs at least one waypoint".into()));
        }
        for point in &input.waypoints {
            point.validate()?;
        }
        let slot = slot_for(input.hour)?;

        let mut waypoints = Vec::with_capacity(input.waypoints.len());
        let mut distinct: BTreeMap<String, RiskHotspot> = BTreeMap::new();
        let mut degraded = false;

        for point in &input.waypoints {
            let (hotspots, point_degraded) = self
                .hotspots_near(*point, self.policy.hotspot_scan_radius_m)
                .await?;
            degraded |= point_degraded;

            waypoints.push(WaypointScore {
                point: *point,
                base_score: base_score(slot, location_risk_from_hotspots(&hotspots)),
                hotspot_count: hotspots.len(),
            });
            for hotspot in hotspots {
                distinct.entry(hotspot.id.clone()).or_insert(hotspot);
            }
        }

        let scores: Vec<u8> = waypoints.iter().map(|w| w.base_score).collect();
        let safety_score = route_score(&scores);
        let distance = path_length_meters(&input.waypoints);
        let hotspots: Vec<RiskHotspot> = distinct.into_values().collect();

        Ok(RouteAnalysis {
            safety_score,
            safety_level: SafetyLevel::classify(
                safety_score,
                self.policy.thresholds_for(input.profile.female),
            ),
            time_slot: slot,
            distance_meters: distance,
            difficulty: RouteDifficulty::from_distance(distance),
            waypoints,
            recommendations: recommendations(slot, &input.profile, &hotspots),
            hotspots,
            degraded,
        })
    }
}
