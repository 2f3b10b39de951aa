//! Run configuration and run result.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{InstanceStats, RemainingMessages, RunError};

/// Instance stdout handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdoutMode {
    /// Only one instance may write; its output becomes ours
    #[default]
    Contest,
    /// Instances share our stdout untouched
    All,
    /// Every line is prefixed with `STDOUT <i>: `
    Tagged,
    /// One file per instance
    Files,
}

/// Instance stderr handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StderrMode {
    /// Instances share our stderr untouched
    #[default]
    All,
    /// Every line is prefixed with `STDERR <i>: `
    Tagged,
    /// One file per instance
    Files,
}

/// What a non-zero instance exit means for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// The run fails once everything has drained
    #[default]
    Fail,
    /// The exit is only recorded in the stats
    Ignore,
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Name used on the command line and in profiles
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = RunError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(RunError::configuration(
                        stringify!($ty),
                        format!("unknown value '{other}'"),
                    )),
                }
            }
        }
    };
}

string_enum!(StdoutMode { Contest => "contest", All => "all", Tagged => "tagged", Files => "files" });
string_enum!(StderrMode { All => "all", Tagged => "tagged", Files => "files" });
string_enum!(ExitPolicy { Fail => "fail", Ignore => "ignore" });

/// Parameters of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of instances, `1..=MAX_INSTANCES`
    pub instances: usize,

    /// Stdout handling
    pub stdout: StdoutMode,

    /// Stderr handling
    pub stderr: StderrMode,

    /// Filename stem for `files` modes (None = binary path without extension)
    pub prefix: Option<String>,

    /// Print orphaned-message warnings
    pub warn_unreceived: bool,

    /// Print the per-instance table
    pub print_stats: bool,

    /// Stream message trace records to stderr
    pub trace_comm: bool,

    /// Non-zero exit handling
    pub nonzero_exit: ExitPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            instances: 1,
            stdout: StdoutMode::default(),
            stderr: StderrMode::default(),
            prefix: None,
            warn_unreceived: true,
            print_stats: false,
            trace_comm: false,
            nonzero_exit: ExitPolicy::default(),
        }
    }
}

/// Outcome of one run, produced once by the router
#[derive(Debug)]
pub struct RunResult {
    /// Stats ordered by instance ID
    pub instances: Vec<InstanceStats>,

    /// Messages nobody consumed
    pub remaining: RemainingMessages,

    /// First fatal error, if the run failed
    pub error: Option<RunError>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Instance with the longest lifetime (the last one wins ties)
    pub fn longest_running(&self) -> Option<&InstanceStats> {
        self.instances
            .iter()
            .max_by_key(|stats| stats.total_time())
    }
}
