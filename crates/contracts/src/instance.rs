//! Instance identity, lifecycle state and final statistics.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Instance identifier, always in `0..instances`
pub type InstanceId = u32;

/// Lifecycle state of one instance as seen by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Process is computing (or doing anything but waiting for a message)
    Running,
    /// Process waits on a receive that no queued message satisfies
    Blocked,
    /// Process has exited
    Terminated,
}

/// How an instance process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceExit {
    /// Normal exit with a status code
    Code(i32),
    /// Killed by a signal
    Signal(i32),
}

impl InstanceExit {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl fmt::Display for InstanceExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
        }
    }
}

/// Frozen per-instance statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStats {
    /// Instance ID
    pub id: InstanceId,

    /// Messages sent by this instance (delivered or orphaned)
    pub messages_sent: u64,

    /// Sum of payload lengths of those messages
    pub bytes_sent: u64,

    /// Wall-clock time spent outside of blocking receives
    pub time_running: Duration,

    /// Wall-clock time spent waiting for a message
    pub time_blocked: Duration,

    /// Exit outcome (None if the process was never reaped)
    pub exit: Option<InstanceExit>,
}

impl InstanceStats {
    /// Empty stats for a freshly started instance
    pub fn new(id: InstanceId) -> Self {
        Self {
            id,
            messages_sent: 0,
            bytes_sent: 0,
            time_running: Duration::ZERO,
            time_blocked: Duration::ZERO,
            exit: None,
        }
    }

    /// Lifetime of the instance (running + blocked)
    pub fn total_time(&self) -> Duration {
        self.time_running + self.time_blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_success() {
        assert!(InstanceExit::Code(0).success());
        assert!(!InstanceExit::Code(3).success());
        assert!(!InstanceExit::Signal(9).success());
        assert_eq!(InstanceExit::Signal(9).to_string(), "signal 9");
    }

    #[test]
    fn test_total_time() {
        let mut stats = InstanceStats::new(2);
        stats.time_running = Duration::from_millis(30);
        stats.time_blocked = Duration::from_millis(12);
        assert_eq!(stats.total_time(), Duration::from_millis(42));
    }
}
