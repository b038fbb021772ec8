//! Storage destinations for finished archives.
//!
//! A destination answers two questions: is an archive already stored under a
//! name, and store this stream under a name. Every stored object carries the
//! manifest hash under the `content-hash` metadata key.

pub mod local;
pub mod noop;
pub mod s3;

use crate::config::{DestinationConfig, DestinationKind};
use crate::utils::errors::DestinationError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::warn;

pub use local::LocalDestination;
pub use noop::NoopDestination;
pub use s3::S3Destination;

#[async_trait]
pub trait Destination: Send + Sync {
    /// Human-readable target, used in logs
    fn describe(&self) -> String;

    /// True if an object is stored under `name`, whatever hash it carries.
    async fn exists(&self, name: &str, content_hash: &str) -> Result<bool, DestinationError>;

    /// Store the whole of `source` under `name`, returning the bytes stored.
    ///
    /// Nothing is left behind under `name` when `source` fails.
    async fn write(
        &self,
        name: &str,
        content_hash: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, DestinationError>;
}

/// How a stored object's recorded hash relates to the current manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCheck {
    Match,
    Mismatch { recorded: String },
    Unrecorded,
}

impl HashCheck {
    pub fn classify(recorded: Option<&str>, expected: &str) -> Self {
        match recorded {
            Some(hash) if hash == expected => HashCheck::Match,
            Some(hash) => HashCheck::Mismatch {
                recorded: hash.to_string(),
            },
            None => HashCheck::Unrecorded,
        }
    }

    /// Warn about objects that exist but do not match the current contents.
    /// They are kept as they are.
    pub fn report(&self, name: &str, expected: &str) {
        match self {
            HashCheck::Match => {}
            HashCheck::Mismatch { recorded } => warn!(
                object = name,
                recorded = %recorded,
                expected = expected,
                "Stored archive has a different content hash, folder changed since it was archived"
            ),
            HashCheck::Unrecorded => warn!(
                object = name,
                expected = expected,
                "Stored archive has no content hash, cannot tell whether it is current"
            ),
        }
    }
}

/// Build the destination selected in the configuration
pub async fn build(config: &DestinationConfig) -> Result<Arc<dyn Destination>, DestinationError> {
    match config.kind {
        DestinationKind::S3 => Ok(Arc::new(S3Destination::from_config(config).await?)),
        DestinationKind::Local => {
            let path = config.path.as_ref().ok_or_else(|| {
                DestinationError::Config("destination.path is not set".to_string())
            })?;
            Ok(Arc::new(LocalDestination::new(path)?))
        }
        DestinationKind::Noop => Ok(Arc::new(NoopDestination)),
    }
}
