//! Scoring policy: weights, time-of-day tables, thresholds

use serde::{Deserialize, Serialize};

use crate::proximity::RiskLevel;
use crate::types::{Result, RunsafeError};

/// Starting point of the base score before multipliers
pub const BASE_SCORE: f64 = 75.0;

/// Upper bound of the location risk input
pub const MAX_LOCATION_RISK: f64 = 30.0;

/// Part of the day, by local hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeSlot {
    /// 05-12 morning, 12-17 afternoon, 17-21 evening, otherwise night
    pub fn from_hour(hour: u32) -> Result<Self> {
        match hour {
            5..=11 => Ok(Self::Morning),
            12..=16 => Ok(Self::Afternoon),
            17..=20 => Ok(Self::Evening),
            0..=4 | 21..=23 => Ok(Self::Night),
            _ => Err(RunsafeError::BadRequest(format!("hour {} is not in 0..24", hour))),
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Morning => 1.1,
            Self::Afternoon => 1.0,
            Self::Evening => 0.9,
            Self::Night => 0.7,
        }
    }

    /// Lighting sub-score, fixed per slot
    pub fn lighting(&self) -> f64 {
        match self {
            Self::Morning => 85.0,
            Self::Afternoon => 95.0,
            Self::Evening => 70.0,
            Self::Night => 45.0,
        }
    }
}

/// Contribution of one hotspot to the location risk
pub fn hotspot_risk_points(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Low => 2.0,
        RiskLevel::Medium => 5.0,
        RiskLevel::High => 10.0,
        RiskLevel::Critical => 15.0,
    }
}

/// Weights of the five risk factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorWeights {
    pub lighting: f64,
    pub crowd_density: f64,
    pub crime_rate: f64,
    pub traffic_safety: f64,
    pub weather_conditions: f64,
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.lighting
            + self.crowd_density
            + self.crime_rate
            + self.traffic_safety
            + self.weather_conditions
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            lighting: 0.25,
            crowd_density: 0.20,
            crime_rate: 0.30,
            traffic_safety: 0.15,
            weather_conditions: 0.10,
        }
    }
}

/// Lower bounds of the safe / moderate / caution bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyThresholds {
    pub safe: u8,
    pub moderate: u8,
    pub caution: u8,
}

impl SafetyThresholds {
    pub const STANDARD: Self = Self {
        safe: 80,
        moderate: 60,
        caution: 40,
    };

    pub const WOMEN: Self = Self {
        safe: 85,
        moderate: 70,
        caution: 50,
    };
}

/// Coarse band of an overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Moderate,
    Caution,
    Danger,
}

impl SafetyLevel {
    pub fn classify(score: u8, thresholds: &SafetyThresholds) -> Self {
        if score >= thresholds.safe {
            Self::Safe
        } else if score >= thresholds.moderate {
            Self::Moderate
        } else if score >= thresholds.caution {
            Self::Caution
        } else {
            Self::Danger
        }
    }
}

/// Neutral values used when an external signal is not supplied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDefaults {
    pub crowd_density: f64,
    pub traffic_safety: f64,
    pub weather_conditions: f64,
}

impl Default for SignalDefaults {
    fn default() -> Self {
        Self {
            crowd_density: 70.0,
            traffic_safety: 75.0,
            weather_conditions: 80.0,
        }
    }
}

/// Every tunable of the scorer in one place
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub weights: FactorWeights,
    pub defaults: SignalDefaults,
    /// Multiplier applied to the overall score when the profile is flagged female
    pub female_adjustment: f64,
    /// Use [`SafetyThresholds::WOMEN`] for female profiles
    pub strict_female_thresholds: bool,
    pub standard_thresholds: SafetyThresholds,
    pub female_thresholds: SafetyThresholds,
    /// Radius of the hotspot scan around an assessed point
    pub hotspot_scan_radius_m: f64,
    /// Radius within which other live runners are counted
    pub nearby_runner_radius_m: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            defaults: SignalDefaults::default(),
            female_adjustment: 0.95,
            strict_female_thresholds: true,
            standard_thresholds: SafetyThresholds::STANDARD,
            female_thresholds: SafetyThresholds::WOMEN,
            hotspot_scan_radius_m: 500.0,
            nearby_runner_radius_m: 500.0,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<()> {
        if (self.weights.sum() - 1.0).abs() > 1e-9 {
            return Err(RunsafeError::Config(format!(
                "risk factor weights sum to {}, expected 1.0",
                self.weights.sum()
            )));
        }
        if !(0.0..=1.0).contains(&self.female_adjustment) {
            return Err(RunsafeError::Config(format!(
                "female adjustment {} outside [0, 1]",
                self.female_adjustment
            )));
        }
        if self.hotspot_scan_radius_m <= 0.0 || self.nearby_runner_radius_m <= 0.0 {
            return Err(RunsafeError::Config("scan radii must be positive".into()));
        }
        Ok(())
    }

    pub fn thresholds_for(&self, female: bool) -> &SafetyThresholds {
        if female && self.strict_female_thresholds {
            &self.female_thresholds
        } else {
            &self.standard_thresholds
        }
    }
}
