//! Notification cascade
//!
//! One notification per target, run concurrently under a semaphore. Each
//! attempt has its own timeout; a timeout, notifier error or panic yields a
//! `failed` record. Every target produces exactly one record.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::model::{DeliveryStatus, NotificationRecord};
use crate::notify::{EmergencyNotice, NotificationTarget, Notifier};
use crate::store::ReportStore;

#[derive(Debug, Clone, Copy)]
pub struct CascadeConfig {
    /// Notifications in flight at once
    pub concurrency: usize,
    pub per_notification_timeout: Duration,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            per_notification_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything a detached cascade task needs
pub struct Cascade {
    pub notice: EmergencyNotice,
    pub targets: Vec<NotificationTarget>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn ReportStore>,
    pub config: CascadeConfig,
}

impl Cascade {
    /// Attempt every target, returning records in target order
    pub async fn run(self) -> Vec<NotificationRecord> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let notice = Arc::new(self.notice);
        let mut unanswered: Vec<Option<NotificationTarget>> =
            self.targets.iter().cloned().map(Some).collect();
        let mut tasks = JoinSet::new();

        for (position, target) in self.targets.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let notice = Arc::clone(&notice);
            let notifier = Arc::clone(&self.notifier);
            let store = Arc::clone(&self.store);
            let timeout = self.config.per_notification_timeout;

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let record = attempt(&*notifier, target, &notice, timeout).await;
                persist(&*store, &record).await;
                (position, record)
            });
        }

        let mut records = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, record)) => {
                    unanswered[position] = None;
                    records.push((position, record));
                }
                Err(e) => error!(report_id = %notice.report_id, error = %e, "Notification task panicked"),
            }
        }

        for (position, target) in unanswered.into_iter().enumerate() {
            let Some(target) = target else {
                continue;
            };
            let record = record_for(
                Uuid::new_v4().to_string(),
                &target,
                &notice,
                DeliveryStatus::Failed,
                Some("notification task panicked".into()),
            );
            persist(&*self.store, &record).await;
            records.push((position, record));
        }

        records.sort_by_key(|(position, _)| *position);
        records.into_iter().map(|(_, record)| record).collect()
    }
}

async fn persist(store: &dyn ReportStore, record: &NotificationRecord) {
    if let Err(e) = store.insert_notification(record).await {
        error!(
            report_id = %record.report_id,
            notification_id = %record.id,
            error = %e,
            "Failed to persist notification record"
        );
    }
}

fn record_for(
    id: String,
    target: &NotificationTarget,
    notice: &EmergencyNotice,
    status: DeliveryStatus,
    error: Option<String>,
) -> NotificationRecord {
    NotificationRecord {
        id,
        report_id: notice.report_id.clone(),
        target_kind: target.kind(),
        target_id: target.target_id().map(String::from),
        service_type: target.service_type(),
        status,
        error,
        sent_at: Utc::now(),
    }
}

async fn attempt(
    notifier: &dyn Notifier,
    target: NotificationTarget,
    notice: &EmergencyNotice,
    timeout: Duration,
) -> NotificationRecord {
    let id = Uuid::new_v4().to_string();

    let (status, error) =
        match tokio::time::timeout(timeout, notifier.notify(&id, &target, notice)).await {
            Ok(Ok(status)) => (status, None),
            Ok(Err(e)) => {
                warn!(report_id = %notice.report_id, subject = %target.subject(), error = %e, "Notification failed");
                (DeliveryStatus::Failed, Some(e.to_string()))
            }
            Err(_) => {
                warn!(report_id = %notice.report_id, subject = %target.subject(), "Notification timed out");
                (
                    DeliveryStatus::Failed,
                    Some(format!("timed out after {}ms", timeout.as_millis())),
                )
            }
        };

    debug!(report_id = %notice.report_id, notifier = notifier.name(), status = ?status, "Notification attempt");

    record_for(id, &target, notice, status, error)
}
