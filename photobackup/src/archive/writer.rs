//! ZIP producer: encodes a manifest's files into the pipe's write end.

use crate::executor::manifest::{ExportManifest, FileEntry};
use crate::fs::metadata::EntryMetadata;
use crate::transfer::{PipeWriter, Progress};
use crate::utils::errors::ArchiveError;
use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, ZipDateTime, ZipEntryBuilder};
use futures_util::io::{AsyncWrite, AsyncWriteExt};
use std::future::Future;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

const COPY_BUFFER: usize = 64 * 1024;

/// Write every manifest entry as a ZIP entry, then the central directory.
///
/// The pipe is shut down only after the archive is complete. On any error the
/// writer is dropped unfinished, which the reading side sees as an aborted
/// stream.
pub(crate) async fn write_archive(
    manifest: &ExportManifest,
    progress: &mut Progress,
    compression: Compression,
    sink: PipeWriter,
    cancel: &CancellationToken,
) -> Result<(), ArchiveError> {
    let mut zip = ZipFileWriter::with_tokio(sink);

    for entry in &manifest.files {
        progress.starting(entry);
        cancellable(cancel, append_file(&mut zip, entry, compression)).await?;
        progress.finished(entry);
    }

    let mut sink = cancellable(cancel, async move {
        zip.close().await.map_err(ArchiveError::from)
    })
    .await?;
    progress.done();

    sink.close().await.map_err(ArchiveError::Pipe)?;
    Ok(())
}

async fn append_file<W>(
    zip: &mut ZipFileWriter<W>,
    entry: &FileEntry,
    compression: Compression,
) -> Result<(), ArchiveError>
where
    W: AsyncWrite + Unpin,
{
    let read_error = |source| ArchiveError::SourceRead {
        path: entry.path.clone(),
        source,
    };

    let metadata = EntryMetadata::read(&entry.path).await.map_err(read_error)?;
    if metadata.size != entry.size {
        return Err(ArchiveError::SourceChanged {
            path: entry.path.clone(),
            expected: entry.size,
            actual: metadata.size,
        });
    }

    let mut file = tokio::fs::File::open(&entry.path)
        .await
        .map_err(read_error)?;

    let mut builder = ZipEntryBuilder::new(entry.relative_path.clone().into(), compression)
        .last_modification_date(ZipDateTime::from_chrono(&metadata.modified));
    if let Some(mode) = metadata.zip_permissions() {
        builder = builder.unix_permissions(mode);
    }

    let mut writer = zip.write_entry_stream(builder).await?;

    let mut buffer = vec![0u8; COPY_BUFFER];
    let mut copied = 0u64;
    loop {
        let n = file.read(&mut buffer).await.map_err(read_error)?;
        if n == 0 {
            break;
        }

        copied += n as u64;
        // Growing file, no point reading the rest
        if copied > entry.size {
            break;
        }

        writer
            .write_all(&buffer[..n])
            .await
            .map_err(ArchiveError::Pipe)?;
    }

    if copied != entry.size {
        return Err(ArchiveError::SourceChanged {
            path: entry.path.clone(),
            expected: entry.size,
            actual: copied,
        });
    }

    writer.close().await?;
    Ok(())
}

/// Run `fut` until it completes or `cancel` fires, whichever comes first.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ArchiveError>
where
    F: Future<Output = Result<T, ArchiveError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ArchiveError::Cancelled),
        result = fut => result,
    }
}
