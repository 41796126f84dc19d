//! Great-circle geometry over latitude/longitude pairs
//!
//! Pure functions shared by the proximity index, the safety scorer and the
//! geofence broadcaster. Distances are haversine over a spherical Earth,
//! which stays well inside 1% error for the sub-50 km ranges a runner covers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Result, RunsafeError};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in degrees (-180 to 180)
    pub lng: f64,
}

impl GeoPoint {
    /// Create a coordinate without validation
    #[inline]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create a coordinate, rejecting NaN and out-of-range values
    pub fn new_checked(lat: f64, lng: f64) -> Result<Self> {
        let point = Self::new(lat, lng);
        point.validate()?;
        Ok(point)
    }

    /// Returns true if both components are finite and in range
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Validate, producing `InvalidCoordinate` with the offending values
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(RunsafeError::InvalidCoordinate(format!(
                "({}, {}) is outside lat [-90, 90] / lng [-180, 180]",
                self.lat, self.lng
            )))
        }
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

/// A timestamped fix from a client's location source
///
/// Only the latest fix per live session is retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
    /// Horizontal accuracy in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Ground speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees from true north
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl Position {
    /// A bare fix at `point`, captured now
    pub fn at(point: GeoPoint) -> Self {
        Self {
            lat: point.lat,
            lng: point.lng,
            captured_at: Utc::now(),
            accuracy: None,
            speed: None,
            heading: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Haversine distance between two points in meters
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lng1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lng2) = (b.lat.to_radians(), b.lng.to_radians());

    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Clamp guards asin against rounding slightly above 1.0 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Whether `b` lies within `radius_m` meters of `a`
pub fn within(a: GeoPoint, b: GeoPoint, radius_m: f64) -> Result<bool> {
    a.validate()?;
    b.validate()?;
    Ok(distance_meters(a, b) <= radius_m)
}

/// Total length of a polyline in meters
pub fn path_length_meters(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|leg| distance_meters(leg[0], leg[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLES_SQUARE: GeoPoint = GeoPoint::new(31.2304, 121.4737);
    const THE_BUND: GeoPoint = GeoPoint::new(31.2400, 121.4900);

    #[test]
    fn test_distance_zero_for_same_point() {
        assert_eq!(distance_meters(PEOPLES_SQUARE, PEOPLES_SQUARE), 0.0);
    }

    #[test]
    fn test_distance_symmetry() {
        let ab = distance_meters(PEOPLES_SQUARE, THE_BUND);
        let ba = distance_meters(THE_BUND, PEOPLES_SQUARE);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_distance_accuracy() {
        // One degree of latitude is ~111.195 km on a 6371 km sphere
        let d = distance_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 111_195.0 * 0.01);

        // People's Square to the Bund is roughly 1.9 km
        let d = distance_meters(PEOPLES_SQUARE, THE_BUND);
        assert!(d > 1_800.0 && d < 2_000.0, "got {}", d);
    }

    #[test]
    fn test_within_monotonic_in_radius() {
        let d = distance_meters(PEOPLES_SQUARE, THE_BUND);
        assert!(!within(PEOPLES_SQUARE, THE_BUND, d - 1.0).unwrap());
        assert!(within(PEOPLES_SQUARE, THE_BUND, d).unwrap());
        for r in [d + 1.0, d * 2.0, 50_000.0] {
            assert!(within(PEOPLES_SQUARE, THE_BUND, r).unwrap());
        }
    }

    #[test]
    fn test_within_rejects_invalid_coordinates() {
        let bad = GeoPoint::new(91.0, 0.0);
        assert!(matches!(
            within(bad, PEOPLES_SQUARE, 10.0),
            Err(RunsafeError::InvalidCoordinate(_))
        ));

        let nan = GeoPoint::new(f64::NAN, 10.0);
        assert!(matches!(
            within(PEOPLES_SQUARE, nan, 10.0),
            Err(RunsafeError::InvalidCoordinate(_))
        ));

        assert!(GeoPoint::new_checked(0.0, 181.0).is_err());
        assert!(GeoPoint::new_checked(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_path_length() {
        let path = [PEOPLES_SQUARE, THE_BUND, PEOPLES_SQUARE];
        let one_way = distance_meters(PEOPLES_SQUARE, THE_BUND);
        assert!((path_length_meters(&path) - 2.0 * one_way).abs() < 1e-6);
        assert_eq!(path_length_meters(&[PEOPLES_SQUARE]), 0.0);
        assert_eq!(path_length_meters(&[]), 0.0);
    }
}
