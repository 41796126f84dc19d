//! Database layer for runsafe
//!
//! MongoDB storage for contacts, hotspots, emergency reports and their trails.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
