//! Emergency workflow service
//!
//! Owns every write to emergency reports. Writes to one report are
//! serialized through a per-report lock so the update trail keeps its
//! insertion order and monotonic timestamps.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cascade::{Cascade, CascadeConfig};
use super::instructions::instructions_for;
use super::model::{
    estimated_response_secs, DeliveryStatus, EmergencyReport, EmergencyType, NotificationRecord,
    ReportStatus, ReportUpdate, Severity, Transition,
};
use crate::geo::Position;
use crate::notify::{EmergencyNotice, NotificationTarget, Notifier};
use crate::proximity::{fallback_contacts, EntityKind, Nearby, ProximityIndex, RiskLevel};
use crate::store::ReportStore;
use crate::types::{Result, RunsafeError};

/// Longest accepted description or note
pub const MAX_TEXT_LEN: usize = 1_000;

/// Fan-out of a new report to connected runners nearby
#[async_trait::async_trait]
pub trait AreaAlerter: Send + Sync {
    async fn area_alert(&self, report: &EmergencyReport);
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowConfig {
    /// Radius of the responder lookup returned with a report
    pub contact_radius_m: f64,
    pub max_assigned_contacts: usize,
    pub cascade: CascadeConfig,
    /// How long `report()` waits for everything after the durable write
    pub report_deadline: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            contact_radius_m: 5_000.0,
            max_assigned_contacts: 10,
            cascade: CascadeConfig::default(),
            report_deadline: Duration::from_secs(10),
        }
    }
}

/// A validated request to raise an emergency
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub user_id: String,
    pub emergency_type: EmergencyType,
    pub severity: Severity,
    pub location: Position,
    pub description: Option<String>,
}

/// Non-fatal cascade problems attached to a successful report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialCascadeFailure {
    /// Notifications recorded as failed
    pub failed: usize,
    /// The deadline passed; remaining notifications continue in the background
    pub pending: bool,
    pub message: String,
}

/// What the reporter gets back
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportReceipt {
    pub report_id: String,
    pub status: ReportStatus,
    pub estimated_response_time: u32,
    pub assigned_contacts: Vec<Nearby>,
    /// Responders came from the static hotline set
    pub contacts_degraded: bool,
    pub instructions: Vec<String>,
    pub notifications: Vec<NotificationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_cascade: Option<PartialCascadeFailure>,
    pub created_at: DateTime<Utc>,
}

/// A report with its update trail and notifications
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetails {
    pub report: EmergencyReport,
    pub updates: Vec<ReportUpdate>,
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHistory {
    pub reports: Vec<EmergencyReport>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

pub struct EmergencyWorkflow {
    index: Arc<ProximityIndex>,
    reports: Arc<dyn ReportStore>,
    notifier: Arc<dyn Notifier>,
    alerter: Option<Arc<dyn AreaAlerter>>,
    config: WorkflowConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// A writer's claim on a report lock.
///
/// Dropping the last claim evicts the map entry, so ids that never resolve
/// to a report leave nothing behind.
struct LockLease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    report_id: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        // One reference in the map plus ours
        self.locks.remove_if(self.report_id, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

/// Everything the post-write phase of a report needs, detached from `&self`
struct Dispatch {
    index: Arc<ProximityIndex>,
    reports: Arc<dyn ReportStore>,
    notifier: Arc<dyn Notifier>,
    alerter: Option<Arc<dyn AreaAlerter>>,
    config: WorkflowConfig,
}

/// Receipt contents produced after the durable write
struct Dispatched {
    assigned: Vec<Nearby>,
    contacts_degraded: bool,
    notifications: Vec<NotificationRecord>,
    partial_cascade: Option<PartialCascadeFailure>,
}

fn check_text(field: &str, text: &Option<String>) -> Result<()> {
    match text {
        Some(t) if t.chars().count() > MAX_TEXT_LEN => Err(RunsafeError::BadRequest(format!(
            "{} longer than {} characters",
            field, MAX_TEXT_LEN
        ))),
        _ => Ok(()),
    }
}

impl EmergencyWorkflow {
    pub fn new(
        index: Arc<ProximityIndex>,
        reports: Arc<dyn ReportStore>,
        notifier: Arc<dyn Notifier>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            index,
            reports,
            notifier,
            alerter: None,
            config,
            locks: DashMap::new(),
        }
    }

    /// Attach the area-alert fan-out
    pub fn with_area_alerter(mut self, alerter: Arc<dyn AreaAlerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn lease<'a>(&'a self, report_id: &'a str) -> LockLease<'a> {
        let lock = self.locks.entry(report_id.to_string()).or_default().clone();
        LockLease {
            locks: &self.locks,
            report_id,
            lock,
        }
    }

    /// Raise an emergency.
    ///
    /// The report and its first update are written before anything else; a
    /// failed write is a `PersistenceFailure`. Everything after that (area
    /// alert, responder lookup, cascade) runs in its own task under
    /// `report_deadline`. Past the deadline the receipt carries the hotline
    /// set and a pending cascade while the task finishes in the background.
    /// Notification problems never fail the call.
    pub async fn report(&self, request: ReportRequest) -> Result<ReportReceipt> {
        if request.user_id.trim().is_empty() {
            return Err(RunsafeError::BadRequest("userId is required".into()));
        }
        request.location.point().validate()?;
        check_text("description", &request.description)?;

        let now = Utc::now();
        let report = EmergencyReport {
            id: Uuid::new_v4().to_string(),
            emergency_type: request.emergency_type,
            location: request.location,
            severity: request.severity,
            user_id: request.user_id,
            status: ReportStatus::Received,
            description: request.description,
            estimated_response_time: estimated_response_secs(
                request.emergency_type,
                request.severity,
            ),
            created_at: now,
            updated_at: now,
        };

        self.reports
            .insert_report(&report)
            .await
            .map_err(RunsafeError::into_persistence)?;
        self.reports
            .append_update(&ReportUpdate {
                report_id: report.id.clone(),
                sequence: 0,
                status: ReportStatus::Received,
                notes: Some("Report received".into()),
                flagged: false,
                timestamp: now,
            })
            .await
            .map_err(RunsafeError::into_persistence)?;

        info!(
            report_id = %report.id,
            user_id = %report.user_id,
            emergency_type = %report.emergency_type,
            severity = %report.severity,
            "Emergency report created"
        );

        let dispatch = Dispatch {
            index: Arc::clone(&self.index),
            reports: Arc::clone(&self.reports),
            notifier: Arc::clone(&self.notifier),
            alerter: self.alerter.clone(),
            config: self.config,
        };
        let mut handle = tokio::spawn(dispatch.run(report.clone()));

        let dispatched = match tokio::time::timeout(self.config.report_deadline, &mut handle).await {
            Ok(Ok(dispatched)) => dispatched,
            Ok(Err(e)) => {
                error!(report_id = %report.id, error = %e, "Report dispatch aborted");
                Dispatched::fallback(
                    &report,
                    self.config.max_assigned_contacts,
                    false,
                    format!("notification cascade aborted: {}", e),
                )
            }
            Err(_) => {
                // Dropping the handle detaches the task; it keeps writing records
                warn!(
                    report_id = %report.id,
                    deadline_ms = self.config.report_deadline.as_millis() as u64,
                    "Report dispatch still running at deadline"
                );
                Dispatched::fallback(
                    &report,
                    self.config.max_assigned_contacts,
                    true,
                    "notifications still in progress; check the report for results".into(),
                )
            }
        };

        Ok(ReportReceipt {
            report_id: report.id.clone(),
            status: report.status,
            estimated_response_time: report.estimated_response_time,
            assigned_contacts: dispatched.assigned,
            contacts_degraded: dispatched.contacts_degraded,
            instructions: instructions_for(report.emergency_type),
            notifications: dispatched.notifications,
            partial_cascade: dispatched.partial_cascade,
            created_at: report.created_at,
        })
    }

    /// Shorthand for a critical SOS
    pub async fn sos(
        &self,
        user_id: &str,
        location: Position,
        message: Option<String>,
    ) -> Result<ReportReceipt> {
        self.report(ReportRequest {
            user_id: user_id.to_string(),
            emergency_type: EmergencyType::Sos,
            severity: RiskLevel::Critical,
            location,
            description: message,
        })
        .await
    }

    /// Change a report's status.
    ///
    /// Terminal reports reject every change. Moving backwards between
    /// non-terminal statuses is accepted but flagged in the trail.
    pub async fn update_status(
        &self,
        report_id: &str,
        status: ReportStatus,
        notes: Option<String>,
    ) -> Result<EmergencyReport> {
        check_text("notes", &notes)?;
        let lease = self.lease(report_id);
        let _guard = lease.lock.lock().await;

        let mut report = self.load(report_id).await?;
        let transition = report.status.transition_to(status)?;
        let flagged = transition == Transition::Regression;
        if flagged {
            warn!(
                report_id,
                from = %report.status,
                to = %status,
                "Report status moved backwards"
            );
        }

        let previous = report.status;
        let now = Utc::now().max(report.updated_at);
        report.status = status;
        report.updated_at = now;
        self.reports
            .update_report(&report)
            .await
            .map_err(RunsafeError::into_persistence)?;

        if notes.is_some() || flagged {
            self.append_update(&report, notes, flagged, now).await?;
        }

        info!(report_id, from = %previous, to = %status, "Report status updated");
        Ok(report)
    }

    /// Cancel a report on behalf of its owner
    pub async fn cancel(
        &self,
        report_id: &str,
        user_id: &str,
        reason: Option<String>,
    ) -> Result<EmergencyReport> {
        check_text("reason", &reason)?;
        let lease = self.lease(report_id);
        let _guard = lease.lock.lock().await;

        let mut report = self.load(report_id).await?;
        if report.user_id != user_id {
            warn!(report_id, user_id, "Cancel attempted by non-owner");
            return Err(RunsafeError::Unauthorized(format!(
                "report {} belongs to another user",
                report_id
            )));
        }
        report.status.transition_to(ReportStatus::Cancelled)?;

        let now = Utc::now().max(report.updated_at);
        report.status = ReportStatus::Cancelled;
        report.updated_at = now;
        self.reports
            .update_report(&report)
            .await
            .map_err(RunsafeError::into_persistence)?;

        let notes = reason.unwrap_or_else(|| "Cancelled by user".to_string());
        self.append_update(&report, Some(notes), false, now).await?;

        info!(report_id, user_id, "Report cancelled");
        Ok(report)
    }

    /// A user's reports, newest first
    pub async fn history(&self, user_id: &str, limit: usize, offset: usize) -> Result<ReportHistory> {
        let limit = limit.clamp(1, 100);
        let (reports, total) = self.reports.reports_for_user(user_id, limit, offset).await?;
        Ok(ReportHistory {
            reports,
            total,
            limit,
            offset,
        })
    }

    /// A report with its trail and notification records
    pub async fn get(&self, report_id: &str) -> Result<ReportDetails> {
        let report = self.load(report_id).await?;
        let updates = self.reports.updates_for(report_id).await?;
        let notifications = self.reports.notifications_for(report_id).await?;
        Ok(ReportDetails {
            report,
            updates,
            notifications,
        })
    }

    async fn load(&self, report_id: &str) -> Result<EmergencyReport> {
        self.reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| RunsafeError::NotFound(format!("report {}", report_id)))
    }

    async fn append_update(
        &self,
        report: &EmergencyReport,
        notes: Option<String>,
        flagged: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let sequence = self
            .reports
            .updates_for(&report.id)
            .await
            .map_err(RunsafeError::into_persistence)?
            .len() as u32;

        self.reports
            .append_update(&ReportUpdate {
                report_id: report.id.clone(),
                sequence,
                status: report.status,
                notes,
                flagged,
                timestamp,
            })
            .await
            .map_err(RunsafeError::into_persistence)
    }
}

impl Dispatched {
    /// Receipt contents when the post-write phase did not finish
    fn fallback(report: &EmergencyReport, max_contacts: usize, pending: bool, message: String) -> Self {
        let mut assigned = fallback_contacts(report.location.point());
        assigned.truncate(max_contacts);
        Self {
            assigned,
            contacts_degraded: true,
            notifications: Vec::new(),
            partial_cascade: Some(PartialCascadeFailure {
                failed: 0,
                pending,
                message,
            }),
        }
    }
}

impl Dispatch {
    /// Area alert, responder lookup and notification cascade of a stored report
    async fn run(self, report: EmergencyReport) -> Dispatched {
        if let Some(alerter) = &self.alerter {
            alerter.area_alert(&report).await;
        }

        let (assigned, contacts_degraded) = match self
            .index
            .query_or_fallback(
                report.location.point(),
                self.config.contact_radius_m,
                EntityKind::EmergencyContact,
                Some(self.config.max_assigned_contacts),
            )
            .await
        {
            Ok(outcome) => (outcome.results, outcome.degraded),
            Err(e) => {
                warn!(report_id = %report.id, error = %e, "Responder lookup failed, serving hotlines");
                let mut hotlines = fallback_contacts(report.location.point());
                hotlines.truncate(self.config.max_assigned_contacts);
                (hotlines, true)
            }
        };

        let targets = self.cascade_targets(&report).await;
        let (notifications, partial_cascade) = self.run_cascade(&report, targets).await;

        Dispatched {
            assigned,
            contacts_degraded,
            notifications,
            partial_cascade,
        }
    }

    /// Personal contacts opted into emergencies, then services when escalated
    async fn cascade_targets(&self, report: &EmergencyReport) -> Vec<NotificationTarget> {
        let contacts = match self.index.personal_contacts(&report.user_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(report_id = %report.id, error = %e, "Personal contacts unavailable, skipping them");
                Vec::new()
            }
        };

        let mut targets: Vec<NotificationTarget> = contacts
            .into_iter()
            .filter(|c| c.notify_on_emergency)
            .map(NotificationTarget::Personal)
            .collect();

        if report.emergency_type == EmergencyType::Sos || report.severity == RiskLevel::Critical {
            targets.extend(
                report
                    .emergency_type
                    .services()
                    .iter()
                    .copied()
                    .map(NotificationTarget::Service),
            );
        }
        targets
    }

    async fn run_cascade(
        self,
        report: &EmergencyReport,
        targets: Vec<NotificationTarget>,
    ) -> (Vec<NotificationRecord>, Option<PartialCascadeFailure>) {
        if targets.is_empty() {
            return (Vec::new(), None);
        }

        let records = Cascade {
            notice: EmergencyNotice::from_report(report),
            targets,
            notifier: self.notifier,
            store: self.reports,
            config: self.config.cascade,
        }
        .run()
        .await;

        let failed = records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Failed)
            .count();
        let partial = (failed > 0).then(|| PartialCascadeFailure {
            failed,
            pending: false,
            message: format!("{} of {} notifications failed", failed, records.len()),
        });
        info!(report_id = %report.id, sent = records.len() - failed, failed, "Notification cascade finished");
        (records, partial)
    }
}
