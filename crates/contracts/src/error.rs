//! Layered error definitions
//!
//! Categorized by source: configuration / system / protocol / output / lifecycle

use thiserror::Error;

use crate::{InstanceExit, InstanceId};

/// Fatal run error
///
/// Any of these aborts the run and makes the front end exit non-zero.
/// Orphaned messages are not an error, see [`crate::RemainingMessages`].
#[derive(Debug, Error)]
pub enum RunError {
    // ===== Configuration Errors =====
    /// Invalid flags, arguments or profile values
    #[error("configuration error at '{field}': {message}")]
    Configuration { field: String, message: String },

    // ===== System Errors =====
    /// A required OS resource (pipe, file, task) could not be created
    #[error("{context}: {source}")]
    System {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The instance process could not be spawned
    #[error("instance {instance} failed to start: {source}")]
    StartFailed {
        instance: InstanceId,
        #[source]
        source: std::io::Error,
    },

    // ===== Protocol Errors =====
    /// Malformed frame on an instance's outbound comm channel
    #[error("instance {instance} violated the communication protocol: {message}")]
    ProtocolViolation { instance: InstanceId, message: String },

    // ===== Output Errors =====
    /// A second instance wrote to the contest output
    #[error("instance {instance} wrote to the output already owned by instance {owner}")]
    OutputConflict {
        instance: InstanceId,
        owner: InstanceId,
    },

    // ===== Lifecycle Errors =====
    /// Every live instance waits for a message that can never arrive
    #[error("deadlock: instances {blocked:?} wait for messages that can never arrive")]
    Deadlock { blocked: Vec<InstanceId> },

    /// Non-zero exit under [`crate::ExitPolicy::Fail`]
    #[error("instance {instance} terminated with {exit}")]
    InstanceFailed {
        instance: InstanceId,
        exit: InstanceExit,
    },
}

impl RunError {
    /// Create configuration error
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create system error
    pub fn system(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::System {
            context: context.into(),
            source,
        }
    }

    /// Create protocol violation
    pub fn protocol(instance: InstanceId, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            instance,
            message: message.into(),
        }
    }

    /// Instance the error is attributed to, if any
    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            Self::StartFailed { instance, .. }
            | Self::ProtocolViolation { instance, .. }
            | Self::OutputConflict { instance, .. }
            | Self::InstanceFailed { instance, .. } => Some(*instance),
            _ => None,
        }
    }
}
