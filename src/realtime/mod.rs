//! Realtime channel: live positions, geofence warnings and emergency fan-out

mod broadcaster;
mod messages;

pub use broadcaster::{BroadcasterConfig, RealtimeBroadcaster};
pub use messages::{ClientEvent, EmergencyAlert, LocationUpdate, ServerEvent};
