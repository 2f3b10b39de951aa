//! `run` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::RunConfig;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{orphan_warning, resolve_binary, Pipeline, PipelineConfig, PipelineStats};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let config = build_run_config(args)?;
    let binary = resolve_binary(&args.binary)
        .with_context(|| format!("Cannot resolve binary path {}", args.binary.display()))?;

    info!(
        binary = %binary.display(),
        instances = config.instances,
        stdout = %config.stdout,
        stderr = %config.stderr,
        nonzero_exit = %config.nonzero_exit,
        "Configuration loaded"
    );

    let print_stats = config.print_stats;
    let warn_unreceived = config.warn_unreceived;
    let pipeline = Pipeline::new(PipelineConfig {
        run: config,
        binary,
        args: args.args.clone(),
    });

    // Dropping the pipeline kills every instance still running
    let stats = tokio::select! {
        stats = pipeline.run() => stats?,
        signal = shutdown_signal() => {
            warn!(signal, "Received shutdown signal, stopping instances...");
            return Err(CliError::interrupted(signal).into());
        }
    };

    report(stats, warn_unreceived, print_stats)
}

/// Profile (if any) overlaid with explicit flags, then validated
fn build_run_config(args: &RunArgs) -> Result<RunConfig> {
    let base = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading run profile");
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load profile from {}", path.display()))?
        }
        None => RunConfig::default(),
    };

    let config = args.apply_to(base);
    ConfigLoader::validate(&config).context("Invalid run configuration")?;
    Ok(config)
}

/// Print warnings and statistics, and turn a failed run into an error
fn report(mut stats: PipelineStats, warn_unreceived: bool, print_stats: bool) -> Result<()> {
    if let Some(error) = stats.result.error.take() {
        // Instances were killed, so their timings say nothing useful
        return Err(CliError::from(error)).context("Run failed");
    }

    if warn_unreceived {
        if let Some(warning) = orphan_warning(&stats.result.remaining) {
            eprint!("{warning}");
        }
    }

    stats.print_summary(print_stats);
    Ok(())
}

/// Resolves with the name of the first Ctrl+C or SIGTERM received
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use contracts::StdoutMode;
    use std::io::Write;

    fn run_args(args: &[&str]) -> RunArgs {
        let argv = ["parunner", "run"].into_iter().chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(run) => run,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_flags_without_profile() {
        let config = build_run_config(&run_args(&["-n", "3", "./solution"])).unwrap();
        assert_eq!(config.instances, 3);
        assert_eq!(config.stdout, StdoutMode::Contest);
    }

    #[test]
    fn test_profile_then_flags() {
        let mut profile = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(profile, "instances = 6\nstdout = \"files\"\nprint_stats = true").unwrap();
        let path = profile.path().to_str().unwrap().to_owned();

        let config =
            build_run_config(&run_args(&["--config", &path, "-n", "2", "./solution"])).unwrap();
        assert_eq!(config.instances, 2);
        assert_eq!(config.stdout, StdoutMode::Files);
        assert!(config.print_stats);
    }

    #[test]
    fn test_invalid_flag_combination_is_rejected() {
        let err = build_run_config(&run_args(&["--prefix", "", "./solution"])).unwrap_err();
        assert!(format!("{err:#}").contains("prefix"));
    }
}
