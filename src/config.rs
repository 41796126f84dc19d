//! Configuration for runsafe
//!
//! CLI arguments with environment variable fallbacks via clap. A `.env` file
//! is loaded by the binary before parsing.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::emergency::{CascadeConfig, WorkflowConfig};
use crate::realtime::BroadcasterConfig;
use crate::safety::ScoringPolicy;

/// Runsafe - geo-safety gateway for urban runners
#[derive(Parser, Debug, Clone)]
#[command(name = "runsafe")]
#[command(about = "Safety scoring, live geofencing and emergency dispatch for runners")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Development mode: MongoDB and NATS become optional
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "runsafe")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: pretty or json
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Timeout of a single emergency notification in milliseconds
    #[arg(long, env = "NOTIFICATION_TIMEOUT_MS", default_value = "5000")]
    pub notification_timeout_ms: u64,

    /// How long an emergency report waits for its notification cascade
    #[arg(long, env = "REPORT_DEADLINE_MS", default_value = "10000")]
    pub report_deadline_ms: u64,

    /// Notifications sent in parallel per report
    #[arg(long, env = "NOTIFICATION_CONCURRENCY", default_value = "8")]
    pub notification_concurrency: usize,

    /// Radius of the `safety:alert` fan-out around a new emergency
    #[arg(long, env = "AREA_ALERT_RADIUS_M", default_value = "1000")]
    pub area_alert_radius_m: f64,

    /// Radius of the responder lookup returned with a report
    #[arg(long, env = "CONTACT_RADIUS_M", default_value = "5000")]
    pub contact_radius_m: f64,

    /// Radius of the hotspot scan behind a safety score
    #[arg(long, env = "HOTSPOT_SCAN_RADIUS_M", default_value = "500")]
    pub hotspot_scan_radius_m: f64,

    /// Maximum concurrent live sessions
    #[arg(long, env = "MAX_LIVE_SESSIONS", default_value = "10000")]
    pub max_live_sessions: usize,

    /// Multiplier applied to the overall score of female runners
    #[arg(long, env = "FEMALE_SCORE_ADJUSTMENT", default_value = "0.95")]
    pub female_score_adjustment: f64,

    /// Use the stricter 85/70/50 thresholds for female runners
    #[arg(long, env = "STRICT_FEMALE_THRESHOLDS", default_value = "true", action = clap::ArgAction::Set)]
    pub strict_female_thresholds: bool,

    /// Dispatch webhook receiving service notifications (police, medical)
    #[arg(long, env = "DISPATCH_WEBHOOK_URL")]
    pub dispatch_webhook_url: Option<String>,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            female_adjustment: self.female_score_adjustment,
            strict_female_thresholds: self.strict_female_thresholds,
            hotspot_scan_radius_m: self.hotspot_scan_radius_m,
            ..ScoringPolicy::default()
        }
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            contact_radius_m: self.contact_radius_m,
            cascade: CascadeConfig {
                concurrency: self.notification_concurrency,
                per_notification_timeout: Duration::from_millis(self.notification_timeout_ms),
            },
            report_deadline: Duration::from_millis(self.report_deadline_ms),
            ..WorkflowConfig::default()
        }
    }

    pub fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            area_alert_radius_m: self.area_alert_radius_m,
            ..BroadcasterConfig::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(format!("LOG_FORMAT must be pretty or json, got '{}'", self.log_format));
        }
        if self.notification_concurrency == 0 {
            return Err("NOTIFICATION_CONCURRENCY must be at least 1".to_string());
        }
        if self.notification_timeout_ms == 0 || self.report_deadline_ms == 0 {
            return Err("notification timeouts must be positive".to_string());
        }
        if self.max_live_sessions == 0 {
            return Err("MAX_LIVE_SESSIONS must be at least 1".to_string());
        }
        for (name, radius) in [
            ("AREA_ALERT_RADIUS_M", self.area_alert_radius_m),
            ("CONTACT_RADIUS_M", self.contact_radius_m),
            ("HOTSPOT_SCAN_RADIUS_M", self.hotspot_scan_radius_m),
        ] {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(format!("{} must be a positive number of meters", name));
            }
        }
        if let Some(url) = &self.dispatch_webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err("DISPATCH_WEBHOOK_URL must be an http(s) URL".to_string());
            }
        }
        self.scoring_policy()
            .validate()
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["runsafe"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_are_valid() {
        let args = parse(&[]);
        assert!(args.validate().is_ok());
        assert!(!args.json_logs());

        let workflow = args.workflow_config();
        assert_eq!(workflow.cascade.concurrency, 8);
        assert_eq!(workflow.report_deadline, Duration::from_secs(10));
        assert_eq!(args.broadcaster_config().area_alert_radius_m, 1_000.0);
    }

    #[test]
    fn test_scoring_overrides() {
        let args = parse(&[
            "--female-score-adjustment",
            "1.0",
            "--strict-female-thresholds",
            "false",
        ]);
        let policy = args.scoring_policy();
        assert_eq!(policy.female_adjustment, 1.0);
        assert!(!policy.strict_female_thresholds);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(parse(&["--log-format", "xml"]).validate().is_err());
        assert!(parse(&["--notification-concurrency", "0"]).validate().is_err());
        assert!(parse(&["--contact-radius-m=-5"]).validate().is_err());
        assert!(parse(&["--dispatch-webhook-url", "ftp://x"]).validate().is_err());
    }
}
