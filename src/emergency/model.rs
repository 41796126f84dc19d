//! Emergency report entities and the status transition table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geo::Position;
use crate::proximity::RiskLevel;
use crate::types::{Result, RunsafeError};

/// Emergency severity uses the same four-step scale as hotspots
pub type Severity = RiskLevel;

/// Kind of emergency being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyType {
    Sos,
    Medical,
    Accident,
    Harassment,
    Suspicious,
}

impl EmergencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sos => "sos",
            Self::Medical => "medical",
            Self::Accident => "accident",
            Self::Harassment => "harassment",
            Self::Suspicious => "suspicious",
        }
    }

    /// Baseline responder arrival estimate in seconds
    pub fn base_response_secs(&self) -> f64 {
        match self {
            Self::Sos => 300.0,
            Self::Medical => 480.0,
            Self::Accident => 600.0,
            Self::Harassment => 900.0,
            Self::Suspicious => 1200.0,
        }
    }

    /// Services dispatched when the cascade escalates beyond personal contacts
    pub fn services(&self) -> &'static [ServiceType] {
        match self {
            Self::Sos => &[ServiceType::Police],
            Self::Medical | Self::Accident => &[ServiceType::Medical, ServiceType::Police],
            Self::Harassment | Self::Suspicious => &[ServiceType::Police],
        }
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmergencyType {
    type Err = RunsafeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sos" => Ok(Self::Sos),
            "medical" => Ok(Self::Medical),
            "accident" => Ok(Self::Accident),
            "harassment" => Ok(Self::Harassment),
            "suspicious" => Ok(Self::Suspicious),
            other => Err(RunsafeError::InvalidEnum(format!("emergency type '{}'", other))),
        }
    }
}

/// Multiplier applied to the base response time
pub fn severity_multiplier(severity: Severity) -> f64 {
    match severity {
        RiskLevel::Critical => 0.5,
        RiskLevel::High => 0.7,
        RiskLevel::Medium => 1.0,
        RiskLevel::Low => 1.5,
    }
}

/// `round(base[type] * multiplier[severity])` in seconds
pub fn estimated_response_secs(emergency_type: EmergencyType, severity: Severity) -> u32 {
    (emergency_type.base_response_secs() * severity_multiplier(severity)).round() as u32
}

/// Report lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Received,
    Processing,
    Dispatched,
    Resolved,
    Cancelled,
}

/// How a requested status change relates to the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same status; only notes/timestamps change
    Unchanged,
    /// Moves along received → processing → dispatched → resolved, or cancels
    Forward,
    /// Moves back to an earlier non-terminal status; accepted but flagged
    Regression,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Dispatched => "dispatched",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Processing => 1,
            Self::Dispatched => 2,
            Self::Resolved | Self::Cancelled => 3,
        }
    }

    /// Classify a change to `to`; nothing leaves a terminal status
    pub fn transition_to(self, to: ReportStatus) -> Result<Transition> {
        if self.is_terminal() {
            return Err(RunsafeError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        if self == to {
            Ok(Transition::Unchanged)
        } else if to.rank() > self.rank() {
            Ok(Transition::Forward)
        } else {
            Ok(Transition::Regression)
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = RunsafeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "received" => Ok(Self::Received),
            "processing" => Ok(Self::Processing),
            "dispatched" => Ok(Self::Dispatched),
            "resolved" => Ok(Self::Resolved),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RunsafeError::InvalidEnum(format!("status '{}'", other))),
        }
    }
}

/// A user's emergency report. Never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyReport {
    pub id: String,
    #[serde(rename = "type")]
    pub emergency_type: EmergencyType,
    pub location: Position,
    pub severity: Severity,
    pub user_id: String,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub estimated_response_time: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpdate {
    pub report_id: String,
    /// Position in the report's trail, starting at 0
    pub sequence: u32,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set when the status moved backwards
    #[serde(default)]
    pub flagged: bool,
    pub timestamp: DateTime<Utc>,
}

/// Who a notification went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Personal,
    Service,
}

/// Public services reachable by the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Police,
    Medical,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Police => "police",
            Self::Medical => "medical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Failed,
}

/// One notification attempt of a report's cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub report_id: String,
    pub target_kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}
