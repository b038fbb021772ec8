//! Streaming archive pipeline.
//!
//! The ZIP producer and a caller-supplied consumer run concurrently on the
//! current task, joined by a bounded pipe and a shared cancellation scope.
//! Whichever side fails first cancels the scope; the call returns only once
//! both sides have stopped.

mod writer;

use crate::config::CompressionMethod;
use crate::executor::manifest::ExportManifest;
use crate::transfer::{pipe, PipeReader, Progress};
use crate::utils::errors::{DestinationError, StreamError};
use async_zip::Compression;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Chunks buffered between producer and consumer by default
pub const DEFAULT_PIPE_CHUNKS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub compression: CompressionMethod,
    pub pipe_chunks: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::default(),
            pipe_chunks: DEFAULT_PIPE_CHUNKS,
        }
    }
}

impl From<CompressionMethod> for Compression {
    fn from(method: CompressionMethod) -> Self {
        match method {
            CompressionMethod::Stored => Compression::Stored,
            CompressionMethod::Deflate => Compression::Deflate,
        }
    }
}

/// Archive `manifest` into a stream handed to `consume`.
///
/// Returns the consumer's value when both sides succeed. On failure the side
/// that failed first is reported; if the parent token was cancelled instead,
/// the result is [`StreamError::Cancelled`].
pub async fn stream_archive<F, Fut, T>(
    manifest: &ExportManifest,
    progress: &mut Progress,
    options: &ArchiveOptions,
    cancel: &CancellationToken,
    consume: F,
) -> Result<T, StreamError>
where
    F: FnOnce(PipeReader) -> Fut,
    Fut: Future<Output = Result<T, DestinationError>>,
{
    let scope = cancel.child_token();
    let scope = &scope;
    let (sink, source) = pipe(options.pipe_chunks);
    let compression = Compression::from(options.compression);

    let producer = async move {
        let result = writer::write_archive(manifest, progress, compression, sink, scope).await;
        let first = settle(&result, scope);
        (result, first)
    };

    // The consumer is not raced against the scope: it learns about producer
    // failures through the pipe and gets to clean up its partial upload.
    let consumer = async move {
        let result = consume(source).await;
        let first = settle(&result, scope);
        (result, first)
    };

    let ((produced, producer_first), (consumed, consumer_first)) =
        tokio::join!(producer, consumer);

    match (produced, consumed) {
        (Ok(()), Ok(value)) => Ok(value),
        (Err(e), Ok(_)) if producer_first => Err(StreamError::Source(e)),
        (Ok(()), Err(e)) if consumer_first => Err(StreamError::Destination(e)),
        (Err(source), Err(destination)) if producer_first => {
            debug!(error = %destination, "consumer stopped after archive failure");
            Err(StreamError::Source(source))
        }
        (Err(source), Err(destination)) if consumer_first => {
            debug!(error = %source, "producer stopped after consumer failure");
            Err(StreamError::Destination(destination))
        }
        _ => Err(StreamError::Cancelled),
    }
}

/// Cancel the scope on failure. True if this failure was the first one.
fn settle<T, E>(result: &Result<T, E>, scope: &CancellationToken) -> bool {
    if result.is_ok() {
        return false;
    }
    let first = !scope.is_cancelled();
    scope.cancel();
    first
}
