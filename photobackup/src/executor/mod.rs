//! Export run orchestration.
//!
//! Folders are processed one after another:
//! - select files and hash the manifest
//! - ask the destination whether the archive is already stored
//! - otherwise stream the archive into the destination

pub mod manifest;

use crate::archive::{stream_archive, ArchiveOptions};
use crate::config::{Config, FailurePolicy};
use crate::destination::Destination;
use crate::executor::manifest::FileEntry;
use crate::fs::walker::{enumerate_top_level_folders, select_files, PatternSet};
use crate::transfer::progress::{format_duration, format_size};
use crate::transfer::Progress;
use crate::utils::errors::{BackupError, FolderError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// Settings for one export run, resolved from [`Config`]
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub source_dir: PathBuf,
    pub includes: PatternSet,
    pub excludes: PatternSet,
    pub archive: ArchiveOptions,
    pub failure_policy: FailurePolicy,

    /// Render the per-file status line
    pub show_progress: bool,
}

impl ExportSettings {
    pub fn from_config(config: &Config) -> Result<Self, BackupError> {
        Ok(Self {
            source_dir: config.source_dir()?,
            includes: PatternSet::new(&config.source.includes)?,
            excludes: PatternSet::new(&config.source.excludes)?,
            archive: ArchiveOptions {
                compression: config.archive.compression,
                pipe_chunks: config.archive.pipe_chunks,
            },
            failure_policy: config.run.on_folder_error,
            show_progress: true,
        })
    }
}

/// What happened to one folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderOutcome {
    /// An archive is already stored under this name
    Skipped { object: String },

    Uploaded {
        object: String,
        files: usize,
        bytes_read: u64,
        bytes_stored: u64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_stored: u64,
}

impl RunSummary {
    /// Folders the run got to, whatever the outcome
    pub fn attempted(&self) -> usize {
        self.uploaded + self.skipped + self.failed
    }

    pub fn record(&mut self, outcome: &FolderOutcome) {
        match outcome {
            FolderOutcome::Skipped { .. } => self.skipped += 1,
            FolderOutcome::Uploaded { bytes_stored, .. } => {
                self.uploaded += 1;
                self.bytes_stored += bytes_stored;
            }
        }
    }
}

/// A folder that failed under [`FailurePolicy::Continue`]
#[derive(Debug)]
pub struct FolderFailure {
    pub folder: PathBuf,
    pub error: FolderError,
}

/// Main export orchestrator
pub struct Exporter {
    destination: Arc<dyn Destination>,
    settings: ExportSettings,
    cancel: CancellationToken,
}

impl Exporter {
    pub fn new(
        destination: Arc<dyn Destination>,
        settings: ExportSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            destination,
            settings,
            cancel,
        }
    }

    /// Export every top-level folder matching the include patterns
    pub async fn run(&self) -> Result<RunSummary, BackupError> {
        let start_time = Instant::now();
        let folders =
            enumerate_top_level_folders(&self.settings.source_dir, &self.settings.includes)?;

        info!(
            "Exporting {} folders from {} to {}",
            folders.len(),
            self.settings.source_dir.display(),
            self.destination.describe()
        );

        let mut summary = RunSummary::default();
        let mut failed = Vec::new();

        for folder in folders {
            if self.cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }

            let span = info_span!("folder", name = %folder_label(&folder));
            match self.export_folder(&folder).instrument(span).await {
                Ok(outcome) => summary.record(&outcome),
                Err(_) if self.cancel.is_cancelled() => return Err(BackupError::Cancelled),
                Err(e) => {
                    summary.failed += 1;
                    match self.settings.failure_policy {
                        FailurePolicy::Abort => {
                            return Err(BackupError::Folder {
                                folder,
                                source: e,
                            })
                        }
                        FailurePolicy::Continue => {
                            error!("Export of {} failed: {}", folder.display(), e);
                            failed.push(FolderFailure { folder, error: e });
                        }
                    }
                }
            }
        }

        info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            failed = summary.failed,
            stored = %format_size(summary.bytes_stored),
            "Export run finished in {}",
            format_duration(start_time.elapsed().as_secs())
        );

        if failed.is_empty() {
            Ok(summary)
        } else {
            Err(BackupError::Incomplete { failed, summary })
        }
    }

    /// Export one folder unless its archive is already stored
    pub async fn export_folder(&self, folder: &Path) -> Result<FolderOutcome, FolderError> {
        let root = folder.to_path_buf();
        let excludes = self.settings.excludes.clone();
        let manifest = tokio::task::spawn_blocking(move || select_files(&root, &excludes)).await??;
        let object = manifest.object_name();

        if self
            .destination
            .exists(&object, &manifest.content_hash)
            .await
            .map_err(FolderError::Destination)?
        {
            info!("{} already stored, skipping", object);
            return Ok(FolderOutcome::Skipped { object });
        }

        let mut progress = self.folder_progress(&object, &manifest.files);
        info!(
            files = manifest.files.len(),
            size = %format_size(manifest.total_bytes()),
            hash = %manifest.content_hash,
            "Archiving {}",
            progress.label()
        );

        let destination = &self.destination;
        let name = object.as_str();
        let hash = manifest.content_hash.as_str();
        let bytes_stored = stream_archive(
            &manifest,
            &mut progress,
            &self.settings.archive,
            &self.cancel,
            |mut reader| async move { destination.write(name, hash, &mut reader).await },
        )
        .await?;

        Ok(FolderOutcome::Uploaded {
            object,
            files: manifest.files.len(),
            bytes_read: progress.completed_bytes(),
            bytes_stored,
        })
    }
}

impl Exporter {
    /// Status line tracker, labelled with the destination object name
    fn folder_progress(&self, object: &str, files: &[FileEntry]) -> Progress {
        if self.settings.show_progress {
            Progress::new(object, files)
        } else {
            Progress::silent(object, files)
        }
    }
}

fn folder_label(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}
