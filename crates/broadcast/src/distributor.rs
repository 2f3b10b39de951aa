//! Arena-backed broadcast stream.
//!
//! Chunks are immutable `Bytes` appended by the single writer; each reader
//! keeps its own `(chunk, offset)` cursor into the arena. Reader wakers live in
//! a slab under the arena lock so a write can never slip between a reader's
//! "nothing to read" check and its waker registration.
//!
//! The lock is a `std::sync::Mutex`: critical sections are a few index
//! operations and never span an `.await`.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use slab::Slab;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, trace};

use crate::error::BroadcastError;

/// Registered reader; holds its waker while parked
#[derive(Default)]
struct ReaderSlot {
    waker: Option<Waker>,
}

struct Arena {
    chunks: Vec<Bytes>,
    len: u64,
    closed: bool,
    readers: Slab<ReaderSlot>,
}

impl Arena {
    fn wake_readers(&mut self) {
        for (_, slot) in self.readers.iter_mut() {
            if let Some(waker) = slot.waker.take() {
                waker.wake();
            }
        }
    }
}

struct Shared {
    arena: Mutex<Arena>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a broadcast stream: the single writer and a reader factory
pub fn channel() -> (BroadcastWriter, BroadcastDistributor) {
    let shared = Arc::new(Shared {
        arena: Mutex::new(Arena {
            chunks: Vec::new(),
            len: 0,
            closed: false,
            readers: Slab::new(),
        }),
    });

    (
        BroadcastWriter {
            shared: Arc::clone(&shared),
            closed: false,
        },
        BroadcastDistributor { shared },
    )
}

/// The single write cursor
///
/// Dropping the writer closes the stream.
pub struct BroadcastWriter {
    shared: Arc<Shared>,
    closed: bool,
}

impl BroadcastWriter {
    /// Append bytes to the stream; never waits for readers
    ///
    /// # Errors
    /// [`BroadcastError::Closed`] if the stream was already shut down
    pub fn write(&mut self, data: impl Into<Bytes>) -> Result<(), BroadcastError> {
        if self.closed {
            return Err(BroadcastError::Closed);
        }
        let data = data.into();
        if data.is_empty() {
            return Ok(());
        }

        let mut arena = self.shared.lock();
        arena.len += data.len() as u64;
        arena.chunks.push(data);
        arena.wake_readers();
        Ok(())
    }

    /// Mark end-of-stream
    pub fn close(mut self) {
        self.mark_closed();
    }

    /// Total bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.shared.lock().len
    }

    fn mark_closed(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut arena = self.shared.lock();
        arena.closed = true;
        arena.wake_readers();
        debug!(
            bytes = arena.len,
            readers = arena.readers.len(),
            "Broadcast stream closed"
        );
    }
}

impl AsyncWrite for BroadcastWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.write(Bytes::copy_from_slice(buf))?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().mark_closed();
        Poll::Ready(Ok(()))
    }
}

impl Drop for BroadcastWriter {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

/// Hands out independent readers over the shared stream
#[derive(Clone)]
pub struct BroadcastDistributor {
    shared: Arc<Shared>,
}

impl BroadcastDistributor {
    /// Create a reader positioned at the very beginning of the stream
    pub fn new_reader(&self) -> BroadcastReader {
        let key = self.shared.lock().readers.insert(ReaderSlot::default());
        trace!(reader = key, "Broadcast reader created");
        BroadcastReader {
            shared: Arc::clone(&self.shared),
            key: Some(key),
            chunk: 0,
            offset: 0,
        }
    }

    /// Readers not yet released
    pub fn reader_count(&self) -> usize {
        self.shared.lock().readers.len()
    }

    /// Total bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.shared.lock().len
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

/// Independent read cursor
///
/// Dropping the reader releases it.
pub struct BroadcastReader {
    shared: Arc<Shared>,
    /// Slab key, None once released
    key: Option<usize>,
    chunk: usize,
    offset: usize,
}

impl BroadcastReader {
    /// Stop reading and discard whatever is left unread
    ///
    /// Idempotent; later reads report end-of-stream. Never blocks the writer
    /// or other readers.
    pub fn release(&mut self) {
        if let Some(key) = self.key.take() {
            let mut arena = self.shared.lock();
            arena.readers.try_remove(key);
            trace!(reader = key, "Broadcast reader released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.key.is_none()
    }
}

impl AsyncRead for BroadcastReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(key) = this.key else {
            return Poll::Ready(Ok(()));
        };
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut guard = this.shared.lock();
        let arena = &mut *guard;

        if let Some(chunk) = arena.chunks.get(this.chunk) {
            let available = &chunk[this.offset..];
            let to_read = available.len().min(buf.remaining());
            buf.put_slice(&available[..to_read]);

            this.offset += to_read;
            if this.offset == chunk.len() {
                this.chunk += 1;
                this.offset = 0;
            }
            Poll::Ready(Ok(()))
        } else if arena.closed {
            // EOF: closed and fully drained
            Poll::Ready(Ok(()))
        } else if let Some(slot) = arena.readers.get_mut(key) {
            slot.waker = Some(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

impl Drop for BroadcastReader {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BroadcastReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastReader")
            .field("key", &self.key)
            .field("chunk", &self.chunk)
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_late_reader_sees_everything() {
        let (mut writer, distributor) = channel();

        writer.write(&b"hello "[..]).unwrap();
        writer.write(&b"world"[..]).unwrap();
        let mut late = distributor.new_reader();
        writer.close();

        let mut out = Vec::new();
        late.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_readers_with_different_pacing() {
        let (mut writer, distributor) = channel();
        let expected: Vec<u8> = (0..20_000).map(|i| (i % 251) as u8).collect();

        let mut fast = distributor.new_reader();
        let mut slow = distributor.new_reader();

        let fast_task = tokio::spawn(async move {
            let mut out = Vec::new();
            fast.read_to_end(&mut out).await.unwrap();
            out
        });
        let slow_task = tokio::spawn(async move {
            let mut out = Vec::new();
            let mut buf = [0u8; 7];
            loop {
                let n = slow.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
                if out.len() % 700 == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
            out
        });

        for chunk in expected.chunks(333) {
            writer.write(Bytes::copy_from_slice(chunk)).unwrap();
            tokio::task::yield_now().await;
        }
        writer.close();

        assert_eq!(fast_task.await.unwrap(), expected);
        assert_eq!(slow_task.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_writer_never_waits_for_readers() {
        let (mut writer, distributor) = channel();
        let _idle = distributor.new_reader();

        for _ in 0..1000 {
            writer.write(vec![0u8; 1024]).unwrap();
        }
        assert_eq!(writer.bytes_written(), 1024 * 1000);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (mut writer, distributor) = channel();
        let mut released = distributor.new_reader();
        let mut other = distributor.new_reader();
        assert_eq!(distributor.reader_count(), 2);

        writer.write(&b"abc"[..]).unwrap();
        released.release();
        released.release();
        assert!(released.is_released());
        assert_eq!(distributor.reader_count(), 1);

        let mut buf = [0u8; 8];
        assert_eq!(released.read(&mut buf).await.unwrap(), 0);

        writer.close();
        let mut out = Vec::new();
        other.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn test_release_after_eof() {
        let (writer, distributor) = channel();
        let mut reader = distributor.new_reader();
        writer.close();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
        reader.release();
        reader.release();
        drop(reader);
        assert_eq!(distributor.reader_count(), 0);
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let (mut writer, distributor) = channel();
        writer.write_all(b"x").await.unwrap();
        writer.shutdown().await.unwrap();

        assert!(matches!(writer.write(&b"y"[..]), Err(BroadcastError::Closed)));
        assert!(writer.write_all(b"y").await.is_err());
        assert!(distributor.is_closed());
    }

    #[tokio::test]
    async fn test_drop_writer_closes_stream() {
        let (mut writer, distributor) = channel();
        let mut reader = distributor.new_reader();
        writer.write(&b"tail"[..]).unwrap();

        let read_task = tokio::spawn(async move {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        });
        tokio::task::yield_now().await;
        drop(writer);

        assert_eq!(read_task.await.unwrap(), b"tail");
    }
}
