//! Static responder set served when the spatial store is unreachable

use super::entity::{ContactType, EmergencyContact, Nearby, ProximityEntity};
use crate::geo::GeoPoint;

/// National hotlines, reachable from anywhere
const HOTLINES: &[(&str, &str, &str, ContactType)] = &[
    ("fallback-fire", "Fire and Rescue Hotline", "119", ContactType::Fire),
    ("fallback-medical", "Medical Emergency Hotline", "120", ContactType::Medical),
    ("fallback-police", "Police Emergency Hotline", "110", ContactType::Police),
];

/// The hotline set anchored at `center`
///
/// Hotlines have no physical location, so each one is placed at the query
/// point with distance 0 and the set is never radius-filtered.
pub fn fallback_contacts(center: GeoPoint) -> Vec<Nearby> {
    HOTLINES
        .iter()
        .map(|(id, name, phone, contact_type)| Nearby {
            entity: ProximityEntity::EmergencyContact(EmergencyContact {
                id: (*id).to_string(),
                name: (*name).to_string(),
                phone: (*phone).to_string(),
                contact_type: *contact_type,
                lat: center.lat,
                lng: center.lng,
            }),
            distance_meters: 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_set_is_sorted_by_id() {
        let contacts = fallback_contacts(GeoPoint::new(31.23, 121.47));
        let ids: Vec<&str> = contacts.iter().map(|c| c.entity.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(contacts.iter().all(|c| c.distance_meters == 0.0));
    }
}
