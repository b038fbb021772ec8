//! Utility modules shared across the exporter.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
