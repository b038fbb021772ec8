//! Bounded in-memory byte pipe between the archive producer and a consumer.
//!
//! The writer side must be shut down explicitly. A writer dropped without
//! `shutdown()` aborts the stream and the reader reports `UnexpectedEof`
//! instead of a clean end of stream.

use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Largest chunk a single write places on the channel
pub const MAX_CHUNK: usize = 64 * 1024;

/// Create a pipe holding at most `chunks` chunks in flight.
pub fn pipe(chunks: usize) -> (PipeWriter, PipeReader) {
    let (sender, receiver) = mpsc::channel(chunks.max(1));
    let finished = Arc::new(AtomicBool::new(false));

    let writer = PipeWriter {
        sender: PollSender::new(sender),
        finished: finished.clone(),
    };
    let reader = PipeReader {
        receiver,
        pending: Bytes::new(),
        finished,
    };

    (writer, reader)
}

pub struct PipeWriter {
    sender: PollSender<Bytes>,
    finished: Arc<AtomicBool>,
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(self.sender.poll_reserve(cx)).map_err(|_| reader_gone())?;

        let len = buf.len().min(MAX_CHUNK);
        self.sender
            .send_item(Bytes::copy_from_slice(&buf[..len]))
            .map_err(|_| reader_gone())?;

        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.finished.store(true, Ordering::Release);
        self.sender.close();
        Poll::Ready(Ok(()))
    }
}

pub struct PipeReader {
    receiver: mpsc::Receiver<Bytes>,
    pending: Bytes,
    finished: Arc<AtomicBool>,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        while self.pending.is_empty() {
            match ready!(self.receiver.poll_recv(cx)) {
                Some(chunk) => self.pending = chunk,
                None if self.finished.load(Ordering::Acquire) => return Poll::Ready(Ok(())),
                None => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "archive stream aborted before completion",
                    )))
                }
            }
        }

        let len = self.pending.len().min(buf.remaining());
        buf.put_slice(&self.pending[..len]);
        self.pending.advance(len);

        Poll::Ready(Ok(()))
    }
}

fn reader_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer stopped reading")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bytes_arrive_in_order() {
        let (mut writer, mut reader) = pipe(4);

        let producer = async move {
            for chunk in [b"alpha".as_slice(), b"-", b"beta", b"-", b"gamma"] {
                writer.write_all(chunk).await.unwrap();
            }
            writer.shutdown().await.unwrap();
        };
        let consumer = async move {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        };

        let ((), out) = tokio::join!(producer, consumer);
        assert_eq!(out, b"alpha-beta-gamma");
    }

    #[tokio::test]
    async fn test_large_write_is_split_into_chunks() {
        let data: Vec<u8> = (0..MAX_CHUNK * 3 + 17).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();
        let (mut writer, mut reader) = pipe(2);

        let producer = async move {
            writer.write_all(&data).await.unwrap();
            writer.shutdown().await.unwrap();
        };
        let consumer = async move {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        };

        let ((), out) = tokio::join!(producer, consumer);
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_dropped_writer_aborts_stream() {
        let (mut writer, mut reader) = pipe(4);
        writer.write_all(b"partial").await.unwrap();
        drop(writer);

        let mut buf = [0u8; 7];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"partial");

        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_write_after_reader_dropped() {
        let (mut writer, reader) = pipe(4);
        drop(reader);

        let err = writer.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_writer_waits_when_full() {
        let (mut writer, mut reader) = pipe(1);
        writer.write_all(b"first").await.unwrap();

        // Channel holds one chunk, the second write must wait for the reader
        assert!(writer.write_all(b"second").now_or_never().is_none());

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"first");

        writer.write_all(b"second").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_finished_stream() {
        let (mut writer, mut reader) = pipe(1);
        writer.shutdown().await.unwrap();

        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).await.unwrap(), 0);
    }
}
