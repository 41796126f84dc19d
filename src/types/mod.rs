//! Shared types for runsafe

mod error;

pub use error::{RunsafeError, Result};
