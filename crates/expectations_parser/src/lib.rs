//! Parser for validation run configuration (YAML/TOML/JSON formats).
//!
//! A run configuration lists the expectations to check against one batch plus the
//! run-level options (`catch_exceptions`, `result_format`). Every result format in
//! the file is normalised while loading, so malformed formats fail here rather than
//! halfway through a run.
//!
//! # Example
//!
//! ```rust
//! use expectations_parser::parse_yaml;
//!
//! let yaml = r#"
//! name: animal_checks
//! result_format: SUMMARY
//! expectations:
//!   - type: expect_column_values_to_be_in_set
//!     kwargs:
//!       column: animals
//!       value_set: [cat, fish, dog]
//! "#;
//!
//! let config = parse_yaml(yaml).expect("Failed to parse run configuration");
//! assert_eq!(config.expectations.len(), 1);
//! assert!(config.catch_exceptions);
//! ```

use expectations_core::{
    ConfigurationError, ExpectationConfiguration, ResultFormatSpec, ValidationContext,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a run configuration.
#[derive(Debug, Error)]
pub enum ParserError {
    /// YAML parsing or deserialization failed
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),

    /// TOML parsing or deserialization failed
    #[error("Failed to parse TOML: {0}")]
    TomlError(String),

    /// JSON parsing or deserialization failed
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The file parsed but describes an invalid run
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// File I/O error
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Unsupported file format
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Invalid file extension
    #[error("Invalid or missing file extension")]
    InvalidExtension,
}

/// Result type alias for parser operations.
pub type Result<T> = std::result::Result<T, ParserError>;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yml, .yaml)
    Yaml,
    /// TOML format (.toml)
    Toml,
    /// JSON format (.json)
    Json,
}

fn default_catch_exceptions() -> bool {
    true
}

/// Expectations and options for one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Optional run name, copied into the report metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Embed metric failures in results instead of aborting
    #[serde(default = "default_catch_exceptions")]
    pub catch_exceptions: bool,

    /// Run-level result format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_format: Option<ResultFormatSpec>,

    /// Expectations to check
    #[serde(default)]
    pub expectations: Vec<ExpectationConfiguration>,
}

impl RunConfiguration {
    /// Normalises every effective result format and `mostly` value.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn check(&self) -> std::result::Result<(), ConfigurationError> {
        for expectation in &self.expectations {
            expectation.effective_result_format(self.result_format.as_ref())?;
            expectation.mostly()?;
        }
        Ok(())
    }

    /// Builds the validation context for this run.
    pub fn context(&self) -> ValidationContext {
        let mut context = ValidationContext::new().with_catch_exceptions(self.catch_exceptions);
        if let Some(format) = &self.result_format {
            context = context.with_result_format(format.clone());
        }
        if let Some(name) = &self.name {
            context = context.with_metadata("run_name", name.clone());
        }
        context
    }
}

/// Parse a run configuration from a YAML string.
///
/// # Example
///
/// ```rust
/// use expectations_parser::parse_yaml;
///
/// let config = parse_yaml("expectations: []").unwrap();
/// assert!(config.expectations.is_empty());
/// ```
pub fn parse_yaml(content: &str) -> Result<RunConfiguration> {
    let config: RunConfiguration = serde_yaml_ng::from_str(content)?;
    config.check()?;
    Ok(config)
}

/// Parse a run configuration from a TOML string.
///
/// # Example
///
/// ```rust
/// use expectations_parser::parse_toml;
///
/// let toml = r#"
/// catch_exceptions = false
///
/// [[expectations]]
/// type = "expect_column_values_to_not_be_null"
/// kwargs = { column = "id" }
/// "#;
///
/// let config = parse_toml(toml).unwrap();
/// assert!(!config.catch_exceptions);
/// ```
pub fn parse_toml(content: &str) -> Result<RunConfiguration> {
    let config: RunConfiguration =
        toml::from_str(content).map_err(|e| ParserError::TomlError(e.to_string()))?;
    config.check()?;
    Ok(config)
}

/// Parse a run configuration from a JSON string.
pub fn parse_json(content: &str) -> Result<RunConfiguration> {
    let config: RunConfiguration = serde_json::from_str(content)?;
    config.check()?;
    Ok(config)
}

/// Detect the configuration format from a file path based on its extension.
///
/// # Supported Extensions
///
/// * `.yaml`, `.yml` → `ConfigFormat::Yaml`
/// * `.toml` → `ConfigFormat::Toml`
/// * `.json` → `ConfigFormat::Json`
///
/// # Errors
///
/// Returns `ParserError::InvalidExtension` if the file has no extension.
/// Returns `ParserError::UnsupportedFormat` if the extension is not recognized.
pub fn detect_format(path: &Path) -> Result<ConfigFormat> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or(ParserError::InvalidExtension)?;

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(ConfigFormat::Yaml),
        "toml" => Ok(ConfigFormat::Toml),
        "json" => Ok(ConfigFormat::Json),
        other => Err(ParserError::UnsupportedFormat(other.to_string())),
    }
}

/// Parse a run configuration from a file with automatic format detection.
///
/// # Example
///
/// ```no_run
/// use expectations_parser::parse_file;
/// use std::path::Path;
///
/// let config = parse_file(Path::new("checks/animals.yml")).unwrap();
/// println!("Loaded {} expectations", config.expectations.len());
/// ```
pub fn parse_file(path: &Path) -> Result<RunConfiguration> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        ConfigFormat::Yaml => parse_yaml(&content),
        ConfigFormat::Toml => parse_toml(&content),
        ConfigFormat::Json => parse_json(&content),
    }
}
