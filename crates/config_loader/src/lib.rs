//! # Config Loader
//!
//! Run profile loading and validation.
//!
//! Responsibilities:
//! - Parse TOML/JSON run profiles
//! - Validate run configuration legality
//! - Produce a `RunConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("run.toml")).unwrap();
//! println!("Instances: {}", config.instances);
//! ```

mod parser;
mod validator;

pub use contracts::RunConfig;
pub use parser::ConfigFormat;

use contracts::RunError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load run profiles from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a run profile from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<RunConfig, RunError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load a run profile from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<RunConfig, RunError> {
        let config = parser::parse(content, format)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration assembled elsewhere (e.g. from flags)
    pub fn validate(config: &RunConfig) -> Result<(), RunError> {
        validator::validate(config)
    }

    /// Serialize a RunConfig to TOML string
    pub fn to_toml(config: &RunConfig) -> Result<String, RunError> {
        toml::to_string_pretty(config)
            .map_err(|e| RunError::configuration("profile", format!("TOML serialize error: {e}")))
    }

    /// Serialize a RunConfig to JSON string
    pub fn to_json(config: &RunConfig) -> Result<String, RunError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| RunError::configuration("profile", format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer profile format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, RunError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            RunError::configuration("config", "cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            RunError::configuration("config", format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, RunError> {
        std::fs::read_to_string(path)
            .map_err(|e| RunError::system(format!("reading profile {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::StdoutMode;
    use std::io::Write;

    const PROFILE_TOML: &str = r#"
instances = 4
stdout = "files"
prefix = "results/solution"
print_stats = true
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(PROFILE_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.instances, 4);
        assert_eq!(config.stdout, StdoutMode::Files);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(PROFILE_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config, config2);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(PROFILE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config, config2);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let result = ConfigLoader::load_from_str("instances = 101", ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("between 1 and 100"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "instances": 2, "trace_comm": true }}"#).unwrap();

        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.instances, 2);
        assert!(config.trace_comm);
    }

    #[test]
    fn test_load_from_path_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_load_from_missing_path() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, RunError::System { .. }));
    }
}
