//! Dry-run destination: archives everything, stores nothing.

use super::Destination;
use crate::utils::errors::DestinationError;
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDestination;

#[async_trait]
impl Destination for NoopDestination {
    fn describe(&self) -> String {
        "dry run (nothing is stored)".to_string()
    }

    async fn exists(&self, _name: &str, _content_hash: &str) -> Result<bool, DestinationError> {
        Ok(false)
    }

    async fn write(
        &self,
        name: &str,
        _content_hash: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, DestinationError> {
        let bytes = tokio::io::copy(source, &mut tokio::io::sink()).await?;
        info!(object = name, bytes, "Dry run, archive discarded");
        Ok(bytes)
    }
}
