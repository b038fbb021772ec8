//! Error types for folder selection, archiving, destinations and the export run.

use crate::executor::{FolderFailure, RunSummary};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while selecting folders and files.
#[derive(Error, Debug)]
pub enum TraversalError {
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("File name is not valid UTF-8: {}", .path.display())]
    NonUtf8Path { path: PathBuf },
}

/// Failures on the producing side of the archive stream.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read source file {}: {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source file {} changed size while archiving (selected {expected} bytes, read {actual})", .path.display())]
    SourceChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("ZIP encoding error: {0}")]
    Zip(#[from] async_zip::error::ZipError),

    #[error("Archive pipe error: {0}")]
    Pipe(#[source] io::Error),

    #[error("Archiving cancelled")]
    Cancelled,
}

/// Failures reported by a storage destination.
#[derive(Error, Debug)]
pub enum DestinationError {
    #[error("Destination not found: {0}")]
    NotFound(String),

    #[error("Destination I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{operation} failed for '{key}': {message}")]
    Request {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Invalid metadata for '{key}': {message}")]
    InvalidMetadata { key: String, message: String },

    #[error("Destination configuration error: {0}")]
    Config(String),
}

/// Outcome of a failed archive stream. Only the originating side is reported.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Building archive: {0}")]
    Source(#[source] ArchiveError),

    #[error("Writing to destination: {0}")]
    Destination(#[source] DestinationError),

    #[error("Archive stream cancelled")]
    Cancelled,
}

/// Failure while exporting one top-level folder.
#[derive(Error, Debug)]
pub enum FolderError {
    #[error(transparent)]
    Traversal(#[from] TraversalError),

    #[error("Checking destination: {0}")]
    Destination(#[source] DestinationError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("File selection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Traversal(#[from] TraversalError),

    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("Exporting {}: {source}", .folder.display())]
    Folder {
        folder: PathBuf,
        #[source]
        source: FolderError,
    },

    #[error("{} of {} folders failed: {}", .failed.len(), .summary.attempted(), folder_list(.failed))]
    Incomplete {
        failed: Vec<FolderFailure>,
        summary: RunSummary,
    },

    #[error("Backup cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn folder_list(failed: &[FolderFailure]) -> String {
    failed
        .iter()
        .map(|f| f.folder.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, BackupError>;
