//! GeoJSON point as stored in 2dsphere-indexed fields

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// `{"type": "Point", "coordinates": [lng, lat]}`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GeoJsonPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl GeoJsonPoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.coordinates[1], self.coordinates[0])
    }
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [point.lng, point.lat],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_are_lng_lat() {
        let geo = GeoJsonPoint::from(GeoPoint::new(31.23, 121.47));
        assert_eq!(geo.coordinates, [121.47, 31.23]);
        assert_eq!(geo.point(), GeoPoint::new(31.23, 121.47));

        let bson = bson::to_document(&geo).unwrap();
        assert_eq!(bson.get_str("type").unwrap(), "Point");
    }
}
