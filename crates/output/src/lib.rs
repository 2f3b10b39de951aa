//! # Output
//!
//! Everything between instance standard streams and our own.
//!
//! Responsibilities:
//! - arbitrate the contest output (single writer wins)
//! - multiplex many instance writers onto one real stream
//! - tag lines with their instance, or split them into files
//! - tell "the receiver went away" apart from real I/O failures

pub mod arbiter;
pub mod classify;
pub mod error;
pub mod files;
pub mod metrics;
pub mod mux;
pub mod tagging;

pub use arbiter::{copy_to_contest, ContestWriter, OutputArbiter};
pub use classify::{feed_input, is_writer_error, ClassifiedWriter, WriterError};
pub use error::OutputError;
pub use files::{default_stem, output_file_path, write_to_file, StreamKind};
pub use metrics::{MetricsSnapshot, MuxMetrics};
pub use mux::{MuxWriter, OutputMux};
pub use tagging::{stream_prefix, tag_lines};
