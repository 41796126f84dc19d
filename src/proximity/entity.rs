//! Point-of-interest entities returned by proximity queries

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::types::RunsafeError;

/// How long an unverified hotspot stays in active consideration
pub const HOTSPOT_UNVERIFIED_TTL_DAYS: i64 = 7;

/// Entity kinds a proximity query can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    EmergencyContact,
    PersonalContact,
    Hotspot,
    LiveUser,
}

impl EntityKind {
    /// At-rest kinds live in the spatial store; live users only in memory
    pub fn is_at_rest(&self) -> bool {
        !matches!(self, Self::LiveUser)
    }
}

/// Public responder categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    Police,
    Medical,
    Fire,
    Security,
    Hotline,
}

/// A public emergency responder (police post, clinic, hotline desk)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub contact_type: ContactType,
    pub lat: f64,
    pub lng: f64,
}

/// One of a user's own contacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalContact {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default)]
    pub notify_on_emergency: bool,
    /// Last known home/work location, when the user shared one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Hotspot category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotspotType {
    Crime,
    Accident,
    Lighting,
    Crowd,
    Weather,
}

impl HotspotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crime => "crime",
            Self::Accident => "accident",
            Self::Lighting => "lighting",
            Self::Crowd => "crowd",
            Self::Weather => "weather",
        }
    }
}

impl fmt::Display for HotspotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HotspotType {
    type Err = RunsafeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crime" => Ok(Self::Crime),
            "accident" => Ok(Self::Accident),
            "lighting" => Ok(Self::Lighting),
            "crowd" => Ok(Self::Crowd),
            "weather" => Ok(Self::Weather),
            other => Err(RunsafeError::InvalidEnum(format!("hotspot type '{}'", other))),
        }
    }
}

/// Severity scale shared by hotspots and emergency reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = RunsafeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(RunsafeError::InvalidEnum(format!("level '{}'", other))),
        }
    }
}

/// A reported area of elevated risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskHotspot {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type")]
    pub hotspot_type: HotspotType,
    pub level: RiskLevel,
    pub radius_meters: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub reported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl RiskHotspot {
    /// Create an unverified hotspot reported now
    pub fn reported(
        point: GeoPoint,
        hotspot_type: HotspotType,
        level: RiskLevel,
        radius_meters: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            lat: point.lat,
            lng: point.lng,
            hotspot_type,
            level,
            radius_meters,
            description: None,
            reported_at: Utc::now(),
            verified_at: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    /// Verified hotspots never expire; unverified ones drop out after a week
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.verified_at.is_some()
            || self.reported_at + Duration::days(HOTSPOT_UNVERIFIED_TTL_DAYS) >= now
    }
}

/// A connected runner with a known position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUser {
    pub user_id: String,
    pub session_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub updated_at: DateTime<Utc>,
}

/// Anything a proximity query can return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProximityEntity {
    EmergencyContact(EmergencyContact),
    PersonalContact(PersonalContact),
    Hotspot(RiskHotspot),
    LiveUser(LiveUser),
}

impl ProximityEntity {
    pub fn id(&self) -> &str {
        match self {
            Self::EmergencyContact(c) => &c.id,
            Self::PersonalContact(c) => &c.id,
            Self::Hotspot(h) => &h.id,
            Self::LiveUser(u) => &u.user_id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::EmergencyContact(_) => EntityKind::EmergencyContact,
            Self::PersonalContact(_) => EntityKind::PersonalContact,
            Self::Hotspot(_) => EntityKind::Hotspot,
            Self::LiveUser(_) => EntityKind::LiveUser,
        }
    }

    /// Location of the entity; personal contacts without one have none
    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            Self::EmergencyContact(c) => Some(GeoPoint::new(c.lat, c.lng)),
            Self::PersonalContact(c) => c.location,
            Self::Hotspot(h) => Some(h.point()),
            Self::LiveUser(u) => Some(GeoPoint::new(u.lat, u.lng)),
        }
    }
}

/// A proximity hit: the entity and its distance from the query center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nearby {
    #[serde(flatten)]
    pub entity: ProximityEntity,
    pub distance_meters: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotspot(reported_days_ago: i64, verified: bool) -> RiskHotspot {
        let now = Utc::now();
        RiskHotspot {
            id: "h1".into(),
            lat: 31.23,
            lng: 121.47,
            hotspot_type: HotspotType::Crime,
            level: RiskLevel::High,
            radius_meters: 200.0,
            description: None,
            reported_at: now - Duration::days(reported_days_ago),
            verified_at: verified.then(|| now - Duration::days(reported_days_ago)),
        }
    }

    #[test]
    fn test_unverified_hotspot_expires_after_a_week() {
        let now = Utc::now();
        assert!(hotspot(6, false).is_active_at(now));
        assert!(!hotspot(8, false).is_active_at(now));
    }

    #[test]
    fn test_verified_hotspot_never_expires() {
        let now = Utc::now();
        assert!(hotspot(8, true).is_active_at(now));
        assert!(hotspot(400, true).is_active_at(now));
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("critical".parse::<RiskLevel>().unwrap(), RiskLevel::Critical);
        assert!(matches!(
            "extreme".parse::<RiskLevel>(),
            Err(RunsafeError::InvalidEnum(_))
        ));
        assert!(RiskLevel::Critical > RiskLevel::Low);
    }

    #[test]
    fn test_entity_serializes_with_kind_tag() {
        let entity = ProximityEntity::Hotspot(hotspot(1, false));
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["kind"], "hotspot");
        assert_eq!(json["type"], "crime");
        assert_eq!(entity.id(), "h1");
    }
}
