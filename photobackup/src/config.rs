//! Configuration management for the exporter.
//!
//! Loads configuration from a TOML file. Every section and field is optional;
//! command line flags override the file.

use crate::fs::walker::PatternSet;
use crate::utils::errors::BackupError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest part size S3 accepts for all but the last part
pub const MIN_PART_SIZE_MIB: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub destination: DestinationConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory whose top-level folders are exported (default: working directory)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Globs selecting top-level folder names
    #[serde(default = "default_includes")]
    pub includes: Vec<String>,

    /// Globs matched against every path relative to the folder being exported
    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    #[default]
    S3,
    Local,
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub kind: DestinationKind,

    /// Target bucket (s3)
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,

    #[serde(default = "default_storage_class")]
    pub storage_class: String,

    /// Multipart upload part size in MiB
    #[serde(default = "default_part_size_mib")]
    pub part_size_mib: u64,

    /// Per-operation timeout for S3 requests
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Target directory (local)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Entry compression inside the archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    Stored,
    #[default]
    Deflate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub compression: CompressionMethod,

    /// 64 KiB chunks buffered between archiving and upload
    #[serde(default = "default_pipe_chunks")]
    pub pipe_chunks: usize,
}

/// What happens to the run when one folder fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub on_folder_error: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_includes() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_storage_class() -> String {
    "DEEP_ARCHIVE".to_string()
}

fn default_part_size_mib() -> u64 {
    10
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_pipe_chunks() -> usize {
    crate::archive::DEFAULT_PIPE_CHUNKS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: None,
            includes: default_includes(),
            excludes: Vec::new(),
        }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            kind: DestinationKind::default(),
            bucket: None,
            region: None,
            endpoint: None,
            force_path_style: false,
            storage_class: default_storage_class(),
            part_size_mib: default_part_size_mib(),
            timeout_seconds: default_timeout_seconds(),
            path: None,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::default(),
            pipe_chunks: default_pipe_chunks(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Check settings that cannot be expressed in the schema
    pub fn validate(&self) -> Result<(), BackupError> {
        let destination = &self.destination;
        match destination.kind {
            DestinationKind::S3 => {
                if destination.bucket.as_deref().unwrap_or("").is_empty() {
                    return Err(BackupError::Config(
                        "destination.bucket is required for the s3 destination".to_string(),
                    ));
                }
                if destination.part_size_mib < MIN_PART_SIZE_MIB {
                    return Err(BackupError::Config(format!(
                        "destination.part_size_mib must be at least {} (got {})",
                        MIN_PART_SIZE_MIB, destination.part_size_mib
                    )));
                }
            }
            DestinationKind::Local => {
                if destination.path.is_none() {
                    return Err(BackupError::Config(
                        "destination.path is required for the local destination".to_string(),
                    ));
                }
            }
            DestinationKind::Noop => {}
        }

        if self.archive.pipe_chunks == 0 {
            return Err(BackupError::Config(
                "archive.pipe_chunks must be greater than zero".to_string(),
            ));
        }

        PatternSet::new(&self.source.includes)
            .and_then(|_| PatternSet::new(&self.source.excludes))
            .map_err(|e| BackupError::Config(e.to_string()))?;

        Ok(())
    }

    /// Directory to export from, falling back to the working directory
    pub fn source_dir(&self) -> std::io::Result<PathBuf> {
        match &self.source.dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            [source]
            dir = "/photos"
            includes = ["*2023*"]
            excludes = ["*.xmp", "*/darktable_exported/*"]

            [destination]
            kind = "s3"
            bucket = "my-bucket"
            region = "eu-central-1"
            endpoint = "http://minio:9000"
            force_path_style = true
            storage_class = "GLACIER"
            part_size_mib = 16
            timeout_seconds = 60

            [archive]
            compression = "stored"
            pipe_chunks = 4

            [run]
            on_folder_error = "continue"

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.source.dir, Some(PathBuf::from("/photos")));
        assert_eq!(config.source.includes, vec!["*2023*"]);
        assert_eq!(config.source.excludes.len(), 2);
        assert_eq!(config.destination.kind, DestinationKind::S3);
        assert_eq!(config.destination.bucket.as_deref(), Some("my-bucket"));
        assert!(config.destination.force_path_style);
        assert_eq!(config.destination.storage_class, "GLACIER");
        assert_eq!(config.destination.part_size_mib, 16);
        assert_eq!(config.archive.compression, CompressionMethod::Stored);
        assert_eq!(config.archive.pipe_chunks, 4);
        assert_eq!(config.run.on_folder_error, FailurePolicy::Continue);
        assert_eq!(config.log.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.source.dir, None);
        assert_eq!(config.source.includes, vec!["*"]);
        assert!(config.source.excludes.is_empty());
        assert_eq!(config.destination.kind, DestinationKind::S3);
        assert_eq!(config.destination.storage_class, "DEEP_ARCHIVE");
        assert_eq!(config.destination.part_size_mib, 10);
        assert_eq!(config.destination.timeout_seconds, 300);
        assert_eq!(config.archive.compression, CompressionMethod::Deflate);
        assert_eq!(config.archive.pipe_chunks, 16);
        assert_eq!(config.run.on_folder_error, FailurePolicy::Abort);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_section_keeps_field_defaults() {
        let config = Config::from_toml_str(
            r#"
            [destination]
            bucket = "b"
            "#,
        )
        .unwrap();

        assert_eq!(config.destination.storage_class, "DEEP_ARCHIVE");
        assert_eq!(config.destination.part_size_mib, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_requires_bucket() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_part_size_minimum() {
        let mut config = Config::default();
        config.destination.bucket = Some("b".to_string());
        config.destination.part_size_mib = 4;
        assert!(matches!(config.validate(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_local_requires_path() {
        let mut config = Config::default();
        config.destination.kind = DestinationKind::Local;
        assert!(matches!(config.validate(), Err(BackupError::Config(_))));

        config.destination.path = Some(PathBuf::from("/archive"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pipe_chunks_rejected() {
        let mut config = Config::default();
        config.destination.kind = DestinationKind::Noop;
        config.archive.pipe_chunks = 0;
        assert!(matches!(config.validate(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let mut config = Config::default();
        config.destination.kind = DestinationKind::Noop;
        config.source.excludes = vec!["[oops".to_string()];
        assert!(matches!(config.validate(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_unknown_enum_value_rejected() {
        let result = Config::from_toml_str(
            r#"
            [archive]
            compression = "zstd"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_source_dir_falls_back_to_cwd() {
        let config = Config::default();
        assert_eq!(
            config.source_dir().unwrap(),
            std::env::current_dir().unwrap()
        );
    }
}
