//! Traffic counters of one [`crate::OutputMux`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the mux worker and read by whoever holds the mux
#[derive(Debug, Default)]
pub struct MuxMetrics {
    writes: AtomicU64,
    bytes: AtomicU64,
    failures: AtomicU64,
}

impl MuxMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chunk of `len` bytes reached the destination
    pub fn record_write(&self, len: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// The destination rejected a chunk
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`MuxMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub writes: u64,
    pub bytes: u64,
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts_writes_and_failures() {
        let metrics = MuxMetrics::new();
        metrics.record_write(5);
        metrics.record_write(0);
        metrics.record_failure();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                writes: 2,
                bytes: 5,
                failures: 1,
            }
        );
    }
}
