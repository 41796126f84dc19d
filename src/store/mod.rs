//! Storage ports for at-rest data
//!
//! The engine never talks to a database directly. It reads and writes through
//! two traits:
//!
//! - [`SpatialStore`]: radius queries over contacts and hotspots
//! - [`ReportStore`]: emergency reports, their update trail and notifications
//!
//! Both are implemented by [`MongoStore`] (2dsphere indexes, `$geoNear`) and by
//! [`MemoryStore`] (dev mode and tests). Implementations report an unreachable
//! backend as `SourceUnavailable`; write paths relabel that as
//! `PersistenceFailure` before it reaches a caller.

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::emergency::{EmergencyReport, NotificationRecord, ReportUpdate};
use crate::geo::GeoPoint;
use crate::proximity::{EntityKind, Nearby, PersonalContact, RiskHotspot};
use crate::types::Result;

/// Spatial queries over at-rest points of interest
#[async_trait::async_trait]
pub trait SpatialStore: Send + Sync {
    /// Entities of `kind` within `radius_m` of `center`, with distances.
    ///
    /// Ordering is not guaranteed; the proximity index sorts.
    async fn near(&self, center: GeoPoint, radius_m: f64, kind: EntityKind) -> Result<Vec<Nearby>>;

    /// A user's personal contacts, regardless of location
    async fn personal_contacts(&self, user_id: &str) -> Result<Vec<PersonalContact>>;

    /// Insert or replace a hotspot
    async fn upsert_hotspot(&self, hotspot: &RiskHotspot) -> Result<()>;
}

/// Durable emergency records
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: &EmergencyReport) -> Result<()>;

    async fn update_report(&self, report: &EmergencyReport) -> Result<()>;

    async fn get_report(&self, report_id: &str) -> Result<Option<EmergencyReport>>;

    /// Reports of `user_id`, newest first, plus the total count
    async fn reports_for_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EmergencyReport>, u64)>;

    async fn append_update(&self, update: &ReportUpdate) -> Result<()>;

    /// Update trail of a report in insertion order
    async fn updates_for(&self, report_id: &str) -> Result<Vec<ReportUpdate>>;

    async fn insert_notification(&self, record: &NotificationRecord) -> Result<()>;

    async fn notifications_for(&self, report_id: &str) -> Result<Vec<NotificationRecord>>;
}
