//! photobackup library
//!
//! Incremental backup of top-level folders to cold object storage: each
//! folder is streamed as one ZIP archive straight into the destination, and
//! folders already stored under the same name are skipped.

pub mod archive;
pub mod config;
pub mod destination;
pub mod executor;
pub mod fs;
pub mod shutdown;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
