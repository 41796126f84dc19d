//! Database schemas for runsafe
//!
//! Document structures with their index definitions and the mapping to and
//! from engine types. Every located document stores a GeoJSON `location`
//! field covered by a 2dsphere index.

mod contact;
mod geo_json;
mod hotspot;
mod metadata;
mod notification;
mod report;
mod update;

pub use contact::{
    EmergencyContactDoc, PersonalContactDoc, EMERGENCY_CONTACT_COLLECTION,
    PERSONAL_CONTACT_COLLECTION,
};
pub use geo_json::GeoJsonPoint;
pub use hotspot::{HotspotDoc, HOTSPOT_COLLECTION};
pub use metadata::Metadata;
pub use notification::{NotificationDoc, NOTIFICATION_COLLECTION};
pub use report::{ReportDoc, REPORT_COLLECTION};
pub use update::{ReportUpdateDoc, REPORT_UPDATE_COLLECTION};
