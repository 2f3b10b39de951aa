//! Broadcast error types

use thiserror::Error;

/// Broadcast-specific errors
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Write attempted after the stream was closed
    #[error("write after close on broadcast stream")]
    Closed,
}

impl From<BroadcastError> for std::io::Error {
    fn from(err: BroadcastError) -> Self {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, err)
    }
}
