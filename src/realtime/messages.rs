//! Wire frames for the realtime channel
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}`.
//!
//! Client → server:
//! - `location:update` - latest fix for the connected runner
//! - `emergency:alert` - raise an emergency at a location
//! - `ping` - keep-alive
//!
//! Server → client:
//! - `location:updated` - another runner moved
//! - `safety:zone_warning` - you are inside an active hotspot
//! - `emergency:received` - someone raised an emergency
//! - `safety:alert` - an emergency was raised near you
//! - `emergency:confirmed` - your emergency was recorded
//! - `user:offline` - a runner disconnected

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::emergency::{EmergencyType, ReportStatus};
use crate::proximity::{HotspotType, RiskLevel};

/// Frame received from a client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "location:update")]
    LocationUpdate(LocationUpdate),

    #[serde(rename = "emergency:alert")]
    EmergencyAlert(EmergencyAlert),

    #[serde(rename = "ping")]
    Ping,
}

/// Payload of `location:update`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    /// Client capture time; server receive time when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of `emergency:alert`
///
/// Enum fields stay strings here so bad values surface as `InvalidEnum`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    #[serde(rename = "type", default = "default_alert_type")]
    pub emergency_type: String,
    #[serde(default = "default_alert_severity")]
    pub severity: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_alert_type() -> String {
    "sos".to_string()
}

fn default_alert_severity() -> String {
    "critical".to_string()
}

/// Frame sent to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "location:updated")]
    LocationUpdated {
        user_id: String,
        lat: f64,
        lng: f64,
        captured_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        heading: Option<f64>,
    },

    #[serde(rename = "safety:zone_warning")]
    ZoneWarning {
        hotspot_id: String,
        hotspot_type: HotspotType,
        level: RiskLevel,
        distance_meters: f64,
        radius_meters: f64,
        message: String,
    },

    #[serde(rename = "emergency:received")]
    EmergencyReceived {
        report_id: String,
        user_id: String,
        emergency_type: EmergencyType,
        severity: RiskLevel,
        lat: f64,
        lng: f64,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "safety:alert")]
    AreaAlert {
        report_id: String,
        emergency_type: EmergencyType,
        severity: RiskLevel,
        lat: f64,
        lng: f64,
        distance_meters: f64,
        message: String,
    },

    #[serde(rename = "emergency:confirmed")]
    EmergencyConfirmed {
        report_id: String,
        status: ReportStatus,
        estimated_response_time: u32,
        instructions: Vec<String>,
        partial_cascade: bool,
    },

    #[serde(rename = "user:offline")]
    UserOffline {
        user_id: String,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocationUpdated { .. } => "location:updated",
            Self::ZoneWarning { .. } => "safety:zone_warning",
            Self::EmergencyReceived { .. } => "emergency:received",
            Self::AreaAlert { .. } => "safety:alert",
            Self::EmergencyConfirmed { .. } => "emergency:confirmed",
            Self::UserOffline { .. } => "user:offline",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_update() {
        let frame = r#"{"event":"location:update","data":{"lat":31.23,"lng":121.47,"speed":3.2}}"#;
        match serde_json::from_str::<ClientEvent>(frame).unwrap() {
            ClientEvent::LocationUpdate(update) => {
                assert_eq!(update.lat, 31.23);
                assert_eq!(update.speed, Some(3.2));
                assert!(update.timestamp.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_emergency_alert_defaults_to_sos() {
        let frame = r#"{"event":"emergency:alert","data":{"lat":31.23,"lng":121.47}}"#;
        match serde_json::from_str::<ClientEvent>(frame).unwrap() {
            ClientEvent::EmergencyAlert(alert) => {
                assert_eq!(alert.emergency_type, "sos");
                assert_eq!(alert.severity, "critical");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_ping() {
        let frame = r#"{"event":"ping"}"#;
        assert!(matches!(
            serde_json::from_str::<ClientEvent>(frame).unwrap(),
            ClientEvent::Ping
        ));
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::UserOffline {
            user_id: "u1".into(),
            session_id: Uuid::nil(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "user:offline");
        assert_eq!(json["data"]["userId"], "u1");
        assert_eq!(event.name(), "user:offline");
    }
}
