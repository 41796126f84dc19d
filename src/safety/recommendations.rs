//! Fixed-order recommendation rules
//!
//! Rules fire independently; output order is always time, profile, location,
//! generic, so the same inputs give the same list.

use super::policy::TimeSlot;
use super::{ExperienceLevel, RunnerProfile};
use crate::proximity::{RiskHotspot, RiskLevel};

pub fn recommendations(
    slot: TimeSlot,
    profile: &RunnerProfile,
    nearby_hotspots: &[RiskHotspot],
) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();

    // Time of day
    match slot {
        TimeSlot::Night => {
            out.push("Stick to well-lit, busy streets and wear reflective gear.");
            out.push("Share your live location with a trusted contact before you start.");
        }
        TimeSlot::Evening => {
            out.push("Carry a light; visibility drops quickly after sunset.");
        }
        TimeSlot::Morning => {
            out.push("Streets can be quiet early; prefer familiar routes.");
        }
        TimeSlot::Afternoon => {
            out.push("Hydrate well; afternoon heat is at its peak.");
        }
    }

    // Profile
    if profile.female && matches!(slot, TimeSlot::Evening | TimeSlot::Night) {
        out.push("Consider running with a partner or a group after dark.");
    }
    match profile.experience {
        ExperienceLevel::Beginner => {
            out.push("Keep to shorter loops close to home while you build experience.");
        }
        ExperienceLevel::Advanced if slot == TimeSlot::Night => {
            out.push("Long night runs: tell someone your planned route and return time.");
        }
        _ => {}
    }

    // Location
    if !nearby_hotspots.is_empty() {
        out.push("Risk hotspots were reported within 500 m; consider an alternate route.");
    }
    if nearby_hotspots
        .iter()
        .any(|h| h.level >= RiskLevel::High)
    {
        out.push("A high-risk area is close by; avoid it if you can.");
    }

    // Generic
    out.push("Keep your phone charged with emergency contacts set up.");
    out.push("Stay aware of your surroundings and keep music volume low.");

    out.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::proximity::HotspotType;

    #[test]
    fn test_rule_order_is_fixed() {
        let profile = RunnerProfile {
            female: true,
            experience: ExperienceLevel::Beginner,
        };
        let hotspot = RiskHotspot::reported(
            GeoPoint::new(31.23, 121.47),
            HotspotType::Crime,
            RiskLevel::Critical,
            100.0,
        );

        let recs = recommendations(TimeSlot::Night, &profile, &[hotspot]);
        assert_eq!(recs.len(), 8);
        assert!(recs[0].contains("well-lit"));
        assert!(recs[2].contains("partner"));
        assert!(recs[3].contains("shorter loops"));
        assert!(recs[4].contains("500 m"));
        assert!(recs[5].contains("high-risk"));
        assert!(recs[7].contains("surroundings"));
    }

    #[test]
    fn test_location_rule_needs_hotspots() {
        let recs = recommendations(TimeSlot::Afternoon, &RunnerProfile::default(), &[]);
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| !r.contains("hotspot")));
    }
}
