//! Emergency reporting
//!
//! Reports are created, moved through their lifecycle and fanned out to
//! personal contacts and public services here. Every write path goes through
//! [`EmergencyWorkflow`].

mod cascade;
mod instructions;
mod model;
mod workflow;

pub use cascade::{Cascade, CascadeConfig};
pub use instructions::instructions_for;
pub use model::{
    estimated_response_secs, severity_multiplier, DeliveryStatus, EmergencyReport, EmergencyType,
    NotificationRecord, ReportStatus, ReportUpdate, ServiceType, Severity, TargetKind, Transition,
};
pub use workflow::{
    AreaAlerter, EmergencyWorkflow, PartialCascadeFailure, ReportDetails, ReportHistory,
    ReportReceipt, ReportRequest, WorkflowConfig, MAX_TEXT_LEN,
};
