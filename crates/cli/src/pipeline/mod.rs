//! Pipeline orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{resolve_binary, Pipeline, PipelineConfig};
pub use stats::{orphan_warning, PipelineStats};
