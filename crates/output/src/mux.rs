//! OutputMux - one real output stream shared by many instance writers
//!
//! A worker task owns the destination and drains an unbounded queue of
//! chunks. Each `poll_write` on a [`MuxWriter`] becomes exactly one chunk, so
//! a whole line written at once is never interleaved with another writer's.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::metrics::MuxMetrics;

/// Handle to a running output worker
pub struct OutputMux<W> {
    /// Sink name
    name: String,
    /// Channel to send chunks to worker
    tx: mpsc::UnboundedSender<Bytes>,
    /// Shared metrics
    metrics: Arc<MuxMetrics>,
    /// Worker task handle; yields the destination back on shutdown
    worker_handle: JoinHandle<io::Result<W>>,
}

impl<W> OutputMux<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Take ownership of `sink` and spawn the worker task
    pub fn spawn(name: impl Into<String>, sink: W) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(MuxMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle =
            tokio::spawn(async move { mux_worker(sink, rx, worker_metrics, worker_name).await });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<MuxMetrics> {
        &self.metrics
    }

    /// New writer feeding this sink
    pub fn writer(&self) -> MuxWriter {
        MuxWriter {
            tx: self.tx.clone(),
        }
    }

    /// Wait until every queued chunk is written and return the destination
    ///
    /// Every [`MuxWriter`] must be dropped first, otherwise this waits for
    /// them.
    #[instrument(name = "output_mux_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> io::Result<W> {
        drop(self.tx);
        match self.worker_handle.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(format!("output worker panicked: {e}"))),
        }
    }
}

/// Worker task that consumes chunks and writes them to the sink
#[instrument(name = "output_mux_worker", skip(sink, rx, metrics), fields(sink = %name))]
async fn mux_worker<W: AsyncWrite + Unpin>(
    mut sink: W,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    metrics: Arc<MuxMetrics>,
    name: String,
) -> io::Result<W> {
    debug!(sink = %name, "Output worker started");

    while let Some(chunk) = rx.recv().await {
        let written = async {
            sink.write_all(&chunk).await?;
            sink.flush().await
        }
        .await;

        if let Err(e) = written {
            metrics.record_failure();
            error!(sink = %name, error = %e, "Write failed");
            return Err(e);
        }
        metrics.record_write(chunk.len());
    }

    sink.flush().await?;
    debug!(sink = %name, "Output worker stopped");
    Ok(sink)
}

/// Writer half of an [`OutputMux`]
#[derive(Clone)]
pub struct MuxWriter {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl MuxWriter {
    /// Queue one chunk; never waits
    ///
    /// # Errors
    /// `BrokenPipe` once the worker has stopped
    pub fn send(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "output worker stopped"))
    }
}

impl AsyncWrite for MuxWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.send(Bytes::copy_from_slice(buf))?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for MuxWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxWriter").finish()
    }
}
