//! Read-time file metadata carried into archive entries.
//!
//! Entry timestamps and permissions are taken when the file is opened for
//! archiving, not when it was selected.

use chrono::{DateTime, Utc};
use std::path::Path;

/// Metadata recorded on a ZIP entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time
    pub modified: DateTime<Utc>,

    /// File permissions (Unix mode bits)
    pub permissions: Option<u32>,
}

impl EntryMetadata {
    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;

        // Filesystems without mtime support fall back to "now"
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Ok(Self {
            size: metadata.len(),
            modified,
            permissions,
        })
    }

    /// Permission bits in the 16-bit form stored in the ZIP external attributes
    pub fn zip_permissions(&self) -> Option<u16> {
        self.permissions.map(|mode| (mode & 0o7777) as u16)
    }
}
