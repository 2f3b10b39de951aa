//! Output error types

use contracts::{InstanceId, RunError};
use thiserror::Error;

/// Output-specific errors
#[derive(Debug, Error)]
pub enum OutputError {
    /// A non-owner wrote to the contest output
    #[error("instance {instance} wrote to the output already owned by instance {owner}")]
    Conflict {
        instance: InstanceId,
        owner: InstanceId,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OutputError> for RunError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::Conflict { instance, owner } => RunError::OutputConflict { instance, owner },
            OutputError::Io(source) => RunError::system("forwarding instance output", source),
        }
    }
}
