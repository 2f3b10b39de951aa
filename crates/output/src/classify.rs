//! Write-error classification.
//!
//! An instance that exits before reading all of its stdin breaks the pipe we
//! are feeding. That is expected and must not fail the run, while a failure
//! to read our own input must. [`ClassifiedWriter`] marks every error coming
//! from the destination so the two can be told apart after a generic copy.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Error raised by the destination side of a copy
#[derive(Debug, Error)]
#[error("destination write failed: {source}")]
pub struct WriterError {
    #[source]
    source: io::Error,
}

fn classify(source: io::Error) -> io::Error {
    io::Error::new(source.kind(), WriterError { source })
}

/// Whether `err` was produced by a [`ClassifiedWriter`]
pub fn is_writer_error(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<WriterError>())
}

/// Destination wrapper tagging its failures as [`WriterError`]
#[derive(Debug)]
pub struct ClassifiedWriter<W> {
    inner: W,
    written: u64,
}

impl<W> ClassifiedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes the destination accepted so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ClassifiedWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &polled {
            this.written += *n as u64;
        }
        polled.map_err(classify)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_flush(cx)
            .map_err(classify)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_shutdown(cx)
            .map_err(classify)
    }
}

/// Copy an input stream into an instance's stdin
///
/// Destination failures are absorbed (the instance stopped reading); the
/// destination is shut down on success so the instance sees end-of-file.
/// Returns the bytes delivered, which is short of the input when the
/// instance stopped reading early.
///
/// # Errors
/// Only errors from reading `src`
pub async fn feed_input<R, W>(src: &mut R, dst: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut dst = ClassifiedWriter::new(dst);
    let result = match tokio::io::copy(src, &mut dst).await {
        Ok(copied) => dst.shutdown().await.map(|()| copied),
        Err(e) => Err(e),
    };

    match result {
        Ok(copied) => Ok(copied),
        Err(e) if is_writer_error(&e) => {
            debug!(error = %e, delivered = dst.written(), "Instance stopped reading its input");
            Ok(dst.written())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("input vanished")))
        }
    }

    #[tokio::test]
    async fn test_writer_errors_are_tagged() {
        let (sink, reader) = tokio::io::duplex(8);
        drop(reader);

        let mut writer = ClassifiedWriter::new(sink);
        let err = writer.write_all(b"data").await.unwrap_err();
        assert!(is_writer_error(&err));
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_plain_errors_are_not_writer_errors() {
        assert!(!is_writer_error(&io::Error::other("boom")));
        assert!(!is_writer_error(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }

    #[tokio::test]
    async fn test_feed_input_absorbs_closed_destination() {
        let (sink, reader) = tokio::io::duplex(8);
        drop(reader);

        let mut src = &b"more input than anybody reads"[..];
        assert_eq!(feed_input(&mut src, sink).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_feed_input_counts_partial_delivery() {
        let (sink, mut reader) = tokio::io::duplex(4);
        let consumer = tokio::spawn(async move {
            let mut head = [0u8; 4];
            reader.read_exact(&mut head).await.unwrap();
            head
        });

        let mut src = &b"abcdefghijklmnop"[..];
        let delivered = feed_input(&mut src, sink).await.unwrap();
        assert_eq!(&consumer.await.unwrap(), b"abcd");
        assert!((4..16).contains(&delivered), "delivered {delivered}");
    }

    #[tokio::test]
    async fn test_feed_input_propagates_source_errors() {
        let (sink, _reader) = tokio::io::duplex(8);
        let err = feed_input(&mut FailingReader, sink).await.unwrap_err();
        assert!(!is_writer_error(&err));
    }

    #[tokio::test]
    async fn test_feed_input_delivers_and_closes() {
        let (sink, mut reader) = tokio::io::duplex(64);
        let mut src = &b"1 2 3\n"[..];
        assert_eq!(feed_input(&mut src, sink).await.unwrap(), 6);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"1 2 3\n");
    }
}
