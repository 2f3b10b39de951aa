//! # Broadcast
//!
//! Replays one input stream identically to many independently paced readers.
//!
//! ```text
//!   BroadcastWriter ──▶ [ Bytes | Bytes | Bytes | ... ]  append-only arena
//!                          ▲           ▲
//!                   reader 0 cursor   reader 1 cursor   (one per instance)
//! ```
//!
//! - the writer never waits for readers (unbounded buffering)
//! - every reader starts at offset 0, even if created late
//! - end-of-stream is reported only after close and a full drain

mod distributor;
mod error;

pub use distributor::{channel, BroadcastDistributor, BroadcastReader, BroadcastWriter};
pub use error::BroadcastError;
