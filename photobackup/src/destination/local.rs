//! Local directory destination.
//!
//! Archives land as `<dir>/<name>` with the metadata map in a
//! `<dir>/<name>.meta.json` sidecar. Data is streamed into `<name>.partial`
//! and renamed into place only once the stream ended cleanly.

use super::{Destination, HashCheck};
use crate::executor::manifest::CONTENT_HASH_KEY;
use crate::utils::errors::DestinationError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LocalDestination {
    dir: PathBuf,
}

impl LocalDestination {
    /// The directory must already exist; it is never created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DestinationError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(DestinationError::NotFound(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn object_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.meta.json", name))
    }

    fn partial_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.partial", name))
    }

    async fn read_metadata(
        &self,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, DestinationError> {
        let content = match tokio::fs::read(self.sidecar_path(name)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| DestinationError::InvalidMetadata {
                key: name.to_string(),
                message: e.to_string(),
            })
    }

    async fn store(
        &self,
        name: &str,
        content_hash: &str,
        partial: &Path,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, DestinationError> {
        let mut file = tokio::fs::File::create(partial).await?;
        let bytes = tokio::io::copy(source, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let mut metadata = BTreeMap::new();
        metadata.insert(CONTENT_HASH_KEY.to_string(), content_hash.to_string());
        let sidecar = serde_json::to_vec_pretty(&metadata).map_err(|e| {
            DestinationError::InvalidMetadata {
                key: name.to_string(),
                message: e.to_string(),
            }
        })?;
        tokio::fs::write(self.sidecar_path(name), sidecar).await?;

        tokio::fs::rename(partial, self.object_path(name)).await?;
        Ok(bytes)
    }
}

#[async_trait]
impl Destination for LocalDestination {
    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }

    async fn exists(&self, name: &str, content_hash: &str) -> Result<bool, DestinationError> {
        if !tokio::fs::try_exists(self.object_path(name)).await? {
            return Ok(false);
        }

        let metadata = self.read_metadata(name).await?;
        let recorded = metadata
            .as_ref()
            .and_then(|m| m.get(CONTENT_HASH_KEY))
            .map(String::as_str);
        HashCheck::classify(recorded, content_hash).report(name, content_hash);

        Ok(true)
    }

    async fn write(
        &self,
        name: &str,
        content_hash: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, DestinationError> {
        let partial = self.partial_path(name);
        debug!(path = %partial.display(), "Writing archive");

        match self.store(name, content_hash, &partial, source).await {
            Ok(bytes) => {
                info!(object = name, bytes, dir = %self.dir.display(), "Archive stored");
                Ok(bytes)
            }
            Err(e) => {
                remove_leftover(&partial).await;
                remove_leftover(&self.sidecar_path(name)).await;
                Err(e)
            }
        }
    }
}

async fn remove_leftover(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove leftover of failed write");
        }
    }
}
