//! Runsafe - geo-safety gateway for urban runners
//!
//! Runsafe scores how safe a place and a route are at a given hour, keeps a
//! live map of connected runners, and turns an emergency report into a
//! tracked incident with notifications to nearby responders.
//!
//! ## Services
//!
//! - **Geo**: great-circle distance and coordinate validation
//! - **Proximity**: radius queries over responders, contacts, hotspots and live runners
//! - **Safety**: point, realtime and route safety scores
//! - **Emergency**: report lifecycle with a bounded notification cascade
//! - **Realtime**: WebSocket location sharing, zone warnings and area alerts

pub mod config;
pub mod db;
pub mod emergency;
pub mod geo;
pub mod nats;
pub mod notify;
pub mod proximity;
pub mod realtime;
pub mod routes;
pub mod safety;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, RunsafeError};
