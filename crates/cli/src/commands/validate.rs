//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{RunConfig, StderrMode, StdoutMode};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<RunConfig>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating run profile");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Run profile validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            config: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                config: Some(config),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            config: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &RunConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let uses_files = config.stdout == StdoutMode::Files || config.stderr == StderrMode::Files;
    if config.prefix.is_some() && !uses_files {
        warnings.push("prefix is set but neither stdout nor stderr uses files mode".to_string());
    }

    if config.trace_comm && config.stderr == StderrMode::All {
        warnings.push(
            "trace_comm records share stderr with untagged instance output".to_string(),
        );
    }

    if config.instances > 1 && config.stdout == StdoutMode::All {
        warnings.push(format!(
            "stdout = \"all\" lets all {} instances write to stdout unchecked",
            config.instances
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Run profile is valid: {}", result.config_path);

        if let Some(ref config) = result.config {
            println!("\n  Instances: {}", config.instances);
            println!("  Stdout: {}", config.stdout);
            println!("  Stderr: {}", config.stderr);
            if let Some(ref prefix) = config.prefix {
                println!("  Prefix: {}", prefix);
            }
            println!("  Non-zero exit: {}", config.nonzero_exit);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Run profile is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
