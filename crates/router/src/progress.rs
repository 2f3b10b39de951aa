//! Global progress tracking for deadlock detection.
//!
//! A single atomic word packs two counters so every update observes a
//! consistent pair:
//!
//! ```text
//!   63            32 31             0
//!  ┌────────────────┬────────────────┐
//!  │   unfinished   │    blocked     │
//!  └────────────────┴────────────────┘
//! ```
//!
//! `unfinished` counts instances that have not both exited and drained their
//! outbound channel, `blocked` those waiting on an unsatisfiable receive.
//! Blocked instances are always unfinished, so `blocked == unfinished > 0`
//! means nobody is left to send the awaited messages.

use std::sync::atomic::{AtomicU64, Ordering};

const BLOCKED_MASK: u64 = 0xffff_ffff;
const UNFINISHED_ONE: u64 = 1 << 32;

#[derive(Debug)]
pub struct Progress {
    packed: AtomicU64,
}

impl Progress {
    pub fn new(instances: usize) -> Self {
        Self {
            packed: AtomicU64::new((instances as u64) << 32),
        }
    }

    /// An instance became blocked; true if the run is now stalled
    pub fn block(&self) -> bool {
        let prev = self.packed.fetch_add(1, Ordering::SeqCst);
        stalled(prev + 1)
    }

    pub fn unblock(&self) {
        self.packed.fetch_sub(1, Ordering::SeqCst);
    }

    /// An instance exited and drained; true if the run is now stalled
    pub fn finish(&self) -> bool {
        let prev = self.packed.fetch_sub(UNFINISHED_ONE, Ordering::SeqCst);
        stalled(prev - UNFINISHED_ONE)
    }

    pub fn blocked(&self) -> usize {
        (self.packed.load(Ordering::SeqCst) & BLOCKED_MASK) as usize
    }

    pub fn unfinished(&self) -> usize {
        (self.packed.load(Ordering::SeqCst) >> 32) as usize
    }
}

fn stalled(packed: u64) -> bool {
    let blocked = packed & BLOCKED_MASK;
    let unfinished = packed >> 32;
    blocked > 0 && blocked == unfinished
}
