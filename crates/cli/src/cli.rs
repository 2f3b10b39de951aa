//! CLI argument definitions using clap.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use contracts::protocol::MAX_INSTANCES;
use contracts::{ExitPolicy, RunConfig, StderrMode, StdoutMode};
use std::ffi::OsString;
use std::path::PathBuf;

/// parunner - run N copies of a program as one distributed computation
#[derive(Parser, Debug)]
#[command(
    name = "parunner",
    author,
    version,
    about = "Runs N instances of a program that talk over private message channels",
    long_about = "Runs N copies of a single binary as instances of a simulated distributed \n\
                  computation. Every instance gets its id and the instance count in \n\
                  PARUNNER_NODE_ID / PARUNNER_NODES, the same standard input, and a private \n\
                  message channel on file descriptors 3 (receive) and 4 (send)."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true, env = "PARUNNER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all logging except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "PARUNNER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", global = true, env = "PARUNNER_METRICS_PORT")]
    pub metrics_port: u16,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run N instances of a binary
    Run(RunArgs),

    /// Validate a run profile without running anything
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
///
/// Flags left out fall back to the profile, then to the built-in defaults.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Run profile (TOML or JSON) providing defaults for the flags below
    #[arg(short, long, env = "PARUNNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of instances
    #[arg(
        short = 'n',
        long,
        env = "PARUNNER_INSTANCES",
        value_parser = clap::value_parser!(u64).range(1..=MAX_INSTANCES as u64)
    )]
    pub instances: Option<u64>,

    /// Handling of instance stdout
    #[arg(long, value_enum)]
    pub stdout: Option<StdoutArg>,

    /// Handling of instance stderr
    #[arg(long, value_enum)]
    pub stderr: Option<StderrArg>,

    /// Filename stem for `files` modes [default: binary path without extension]
    #[arg(long)]
    pub prefix: Option<String>,

    /// Warn about messages left unreceived after their destination terminated
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub warn_unreceived: Option<bool>,

    /// Print per-instance statistics after the run
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub print_stats: Option<bool>,

    /// Write a `from -> to (size bytes)` record to stderr for every message
    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub trace_comm: Option<bool>,

    /// What a non-zero instance exit means for the run
    #[arg(long, value_enum)]
    pub nonzero_exit: Option<ExitPolicyArg>,

    /// Binary to run as every instance
    pub binary: PathBuf,

    /// Arguments passed to every instance
    #[arg(last = true)]
    pub args: Vec<OsString>,
}

impl RunArgs {
    /// Overlay the explicitly given flags on `base`
    pub fn apply_to(&self, mut base: RunConfig) -> RunConfig {
        if let Some(instances) = self.instances {
            base.instances = instances as usize;
        }
        if let Some(stdout) = self.stdout {
            base.stdout = stdout.into();
        }
        if let Some(stderr) = self.stderr {
            base.stderr = stderr.into();
        }
        if let Some(prefix) = &self.prefix {
            base.prefix = Some(prefix.clone());
        }
        if let Some(warn) = self.warn_unreceived {
            base.warn_unreceived = warn;
        }
        if let Some(print) = self.print_stats {
            base.print_stats = print;
        }
        if let Some(trace) = self.trace_comm {
            base.trace_comm = trace;
        }
        if let Some(policy) = self.nonzero_exit {
            base.nonzero_exit = policy.into();
        }
        base
    }
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the run profile to validate
    #[arg(short, long, default_value = "parunner.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StdoutArg {
    /// Only one instance may write; its output becomes ours
    Contest,
    /// Instances share our stdout untouched
    All,
    /// Prefix every line with `STDOUT <i>: `
    Tagged,
    /// Write `<prefix>.stdout.<i>` per instance
    Files,
}

impl From<StdoutArg> for StdoutMode {
    fn from(arg: StdoutArg) -> Self {
        match arg {
            StdoutArg::Contest => Self::Contest,
            StdoutArg::All => Self::All,
            StdoutArg::Tagged => Self::Tagged,
            StdoutArg::Files => Self::Files,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StderrArg {
    /// Instances share our stderr untouched
    All,
    /// Prefix every line with `STDERR <i>: `
    Tagged,
    /// Write `<prefix>.stderr.<i>` per instance
    Files,
}

impl From<StderrArg> for StderrMode {
    fn from(arg: StderrArg) -> Self {
        match arg {
            StderrArg::All => Self::All,
            StderrArg::Tagged => Self::Tagged,
            StderrArg::Files => Self::Files,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ExitPolicyArg {
    /// Fail the run
    Fail,
    /// Only record the exit in the statistics
    Ignore,
}

impl From<ExitPolicyArg> for ExitPolicy {
    fn from(arg: ExitPolicyArg) -> Self {
        match arg {
            ExitPolicyArg::Fail => Self::Fail,
            ExitPolicyArg::Ignore => Self::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("parunner").chain(args.iter().copied()))
    }

    fn run_args(args: &[&str]) -> RunArgs {
        match parse(args).unwrap().command {
            Commands::Run(run) => run,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_profile() {
        let args = run_args(&[
            "run",
            "-n",
            "5",
            "--stdout",
            "tagged",
            "--warn-unreceived",
            "false",
            "./solution",
        ]);
        let base = RunConfig {
            instances: 2,
            print_stats: true,
            ..RunConfig::default()
        };

        let config = args.apply_to(base);
        assert_eq!(config.instances, 5);
        assert_eq!(config.stdout, StdoutMode::Tagged);
        assert!(!config.warn_unreceived);
        assert!(config.print_stats, "untouched profile value survives");
    }

    #[test]
    fn test_binary_and_trailing_args() {
        let args = run_args(&["run", "./solution", "--", "-x", "input.txt"]);
        assert_eq!(args.binary, PathBuf::from("./solution"));
        assert_eq!(args.args, vec![OsString::from("-x"), OsString::from("input.txt")]);
        assert_eq!(args.apply_to(RunConfig::default()), RunConfig::default());
    }

    #[test]
    fn test_instance_range_enforced() {
        assert!(parse(&["run", "-n", "0", "./solution"]).is_err());
        assert!(parse(&["run", "-n", "101", "./solution"]).is_err());
        assert!(parse(&["run", "-n", "100", "./solution"]).is_ok());
    }

    #[test]
    fn test_contest_is_not_a_stderr_mode() {
        assert!(parse(&["run", "--stderr", "contest", "./solution"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["run", "-vv", "--log-format", "json", "./solution"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }
}
