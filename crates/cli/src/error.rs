//! Error types for CLI operations.

use contracts::RunError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// The run itself failed; the router already stopped every instance
    #[error("{0}")]
    Run(#[from] RunError),

    /// One of our own output streams failed while flushing
    #[error("Failed to flush {stream}: {source}")]
    OutputFlush {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Ctrl+C or SIGTERM before the run finished
    #[error("Interrupted by {signal}")]
    Interrupted { signal: &'static str },
}

impl CliError {
    pub fn output_flush(stream: &'static str, source: std::io::Error) -> Self {
        Self::OutputFlush { stream, source }
    }

    pub fn interrupted(signal: &'static str) -> Self {
        Self::Interrupted { signal }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_message_is_kept() {
        let err = CliError::from(RunError::Deadlock {
            blocked: vec![0, 1],
        });
        assert_eq!(
            err.to_string(),
            "deadlock: instances [0, 1] wait for messages that can never arrive"
        );
    }

    #[test]
    fn test_interrupted() {
        assert_eq!(
            CliError::interrupted("SIGTERM").to_string(),
            "Interrupted by SIGTERM"
        );
    }
}
