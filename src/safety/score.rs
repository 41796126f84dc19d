//! Pure scoring arithmetic

use super::policy::{
    hotspot_risk_points, FactorWeights, SignalDefaults, TimeSlot, BASE_SCORE, MAX_LOCATION_RISK,
};
use super::{ExternalSignals, RiskFactors};
use crate::proximity::RiskHotspot;

/// Location risk clamped to `[0, 30]`; NaN counts as no risk
pub fn clamp_location_risk(location_risk: f64) -> f64 {
    if location_risk.is_nan() {
        return 0.0;
    }
    location_risk.clamp(0.0, MAX_LOCATION_RISK)
}

/// Location risk implied by the active hotspots around a point
pub fn location_risk_from_hotspots(hotspots: &[RiskHotspot]) -> f64 {
    clamp_location_risk(hotspots.iter().map(|h| hotspot_risk_points(h.level)).sum())
}

/// `75 × timeMultiplier × (1 − locationRisk/100)` before truncation
pub fn base_score_raw(slot: TimeSlot, location_risk: f64) -> f64 {
    BASE_SCORE * slot.multiplier() * (1.0 - clamp_location_risk(location_risk) / 100.0)
}

/// Base score truncated to a whole number
pub fn base_score(slot: TimeSlot, location_risk: f64) -> u8 {
    base_score_raw(slot, location_risk).floor().clamp(0.0, 100.0) as u8
}

fn signal(value: Option<f64>, default: f64) -> f64 {
    value
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(0.0, 100.0)
}

/// The five sub-scores, each in `[0, 100]`
pub fn risk_factors(
    slot: TimeSlot,
    signals: &ExternalSignals,
    location_risk: f64,
    defaults: &SignalDefaults,
) -> RiskFactors {
    let crime_default = 100.0 - 2.0 * clamp_location_risk(location_risk);
    RiskFactors {
        lighting: slot.lighting(),
        crowd_density: signal(signals.crowd_density, defaults.crowd_density),
        crime_rate: signal(signals.crime_rate, crime_default),
        traffic_safety: signal(signals.traffic_safety, defaults.traffic_safety),
        weather_conditions: signal(signals.weather_conditions, defaults.weather_conditions),
    }
}

/// Weighted sum of the factors before any profile adjustment
pub fn weighted_sum(factors: &RiskFactors, weights: &FactorWeights) -> f64 {
    weights.lighting * factors.lighting
        + weights.crowd_density * factors.crowd_density
        + weights.crime_rate * factors.crime_rate
        + weights.traffic_safety * factors.traffic_safety
        + weights.weather_conditions * factors.weather_conditions
}

/// Weighted sum times `adjustment`, clamped to `[0, 100]` and rounded
pub fn overall_score(factors: &RiskFactors, weights: &FactorWeights, adjustment: f64) -> u8 {
    (weighted_sum(factors, weights) * adjustment)
        .clamp(0.0, 100.0)
        .round() as u8
}

/// Arithmetic mean of per-waypoint base scores, rounded
pub fn route_score(waypoint_scores: &[u8]) -> u8 {
    if waypoint_scores.is_empty() {
        return 0;
    }
    let total: f64 = waypoint_scores.iter().map(|s| f64::from(*s)).sum();
    (total / waypoint_scores.len() as f64).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::proximity::{HotspotType, RiskLevel};

    #[test]
    fn test_night_multiplier_chain() {
        assert!((base_score_raw(TimeSlot::Night, 0.0) - 52.5).abs() < 1e-9);
        assert_eq!(base_score(TimeSlot::Night, 0.0), 52);
    }

    #[test]
    fn test_location_risk_is_clamped() {
        assert_eq!(base_score(TimeSlot::Afternoon, 30.0), base_score(TimeSlot::Afternoon, 90.0));
        assert_eq!(base_score(TimeSlot::Afternoon, -5.0), 75);
        assert_eq!(base_score(TimeSlot::Morning, 0.0), 82);
    }

    #[test]
    fn test_hotspot_risk_sums_and_clamps() {
        let at = GeoPoint::new(31.23, 121.47);
        let spots: Vec<RiskHotspot> = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
            .into_iter()
            .map(|level| RiskHotspot::reported(at, HotspotType::Crime, level, 100.0))
            .collect();
        assert_eq!(location_risk_from_hotspots(&spots), 17.0);

        let critical: Vec<RiskHotspot> = (0..3)
            .map(|_| RiskHotspot::reported(at, HotspotType::Crime, RiskLevel::Critical, 100.0))
            .collect();
        assert_eq!(location_risk_from_hotspots(&critical), 30.0);
    }

    #[test]
    fn test_defaults_and_weighted_overall() {
        let factors = risk_factors(
            TimeSlot::Afternoon,
            &ExternalSignals::default(),
            0.0,
            &SignalDefaults::default(),
        );
        assert_eq!(factors.crime_rate, 100.0);
        // 23.75 + 14 + 30 + 11.25 + 8
        assert_eq!(overall_score(&factors, &FactorWeights::default(), 1.0), 87);
        // 82.65 rounds up
        assert_eq!(overall_score(&factors, &FactorWeights::default(), 0.95), 83);
    }

    #[test]
    fn test_score_bounds_hold_for_extreme_signals() {
        let weights = FactorWeights::default();
        let defaults = SignalDefaults::default();
        let extremes = [f64::NEG_INFINITY, -1e9, -1.0, 0.0, 50.0, 100.0, 250.0, 1e9, f64::NAN];

        for slot in [TimeSlot::Morning, TimeSlot::Afternoon, TimeSlot::Evening, TimeSlot::Night] {
            for value in extremes {
                let signals = ExternalSignals {
                    crowd_density: Some(value),
                    crime_rate: Some(value),
                    traffic_safety: Some(value),
                    weather_conditions: Some(value),
                };
                let factors = risk_factors(slot, &signals, value, &defaults);
                for f in factors.as_array() {
                    assert!((0.0..=100.0).contains(&f), "factor {} out of range", f);
                }
                assert!(overall_score(&factors, &weights, 1.0) <= 100);
                assert!(base_score(slot, value) <= 100);
            }
        }
    }

    #[test]
    fn test_route_score_is_rounded_mean() {
        assert_eq!(route_score(&[82, 75, 52]), 70);
        assert_eq!(route_score(&[52, 53]), 53);
        assert_eq!(route_score(&[]), 0);
    }
}
