//! Configuration error type.
//!
//! Configuration errors describe requests that can never succeed, whatever the data:
//! unknown identifier columns, malformed result formats, dependency cycles. They are
//! always surfaced to the caller and are never retried or downgraded into a failed
//! expectation result.

use thiserror::Error;

/// Result type for configuration handling.
pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Errors raised while normalising or checking user configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Identifier column is neither an ordinary column nor a named row index
    #[error("Error: The unexpected_index_column '{column}' does not exist in the batch columns or named indices")]
    UnknownIdentifierColumn {
        /// Offending column name
        column: String,
    },

    /// `result_format` could not be interpreted
    #[error("Invalid result_format: {0}")]
    InvalidResultFormat(String),

    /// A detail flag was combined with the bare level shorthand
    #[error("When using `{flag}`, `result_format` must be explicitly specified as an object with a `result_format` level")]
    DetailFlagRequiresStructuredFormat {
        /// Flag that needs the structured form
        flag: String,
    },

    /// `mostly` outside [0, 1]
    #[error("Invalid mostly value {0}: must be between 0 and 1")]
    InvalidMostly(f64),

    /// Expectation type is not known to the engine
    #[error("Unknown expectation type: {0}")]
    UnknownExpectationType(String),

    /// Required keyword argument is missing or has the wrong type
    #[error("Missing or invalid kwarg: {0}")]
    MissingKwarg(String),

    /// Keyword argument has an unusable value
    #[error("Invalid kwarg '{key}': {message}")]
    InvalidKwarg {
        /// Kwarg name
        key: String,
        /// What is wrong with it
        message: String,
    },

    /// SQL dialect was not registered at initialisation
    #[error("Unsupported SQL dialect: {0}")]
    UnsupportedDialect(String),

    /// Metric dependency graph contains a cycle
    #[error("Metric dependency cycle detected between: {}", .metrics.join(", "))]
    DependencyCycle {
        /// Metrics participating in or blocked by the cycle
        metrics: Vec<String>,
    },

    /// Domain kwargs point at a different batch
    #[error("Metric domain refers to batch '{requested}' but the active batch is '{active}'")]
    BatchMismatch {
        /// Batch id in the domain kwargs
        requested: String,
        /// Batch being resolved
        active: String,
    },
}

impl ConfigurationError {
    /// Creates an unknown identifier column error.
    pub fn unknown_identifier_column(column: impl Into<String>) -> Self {
        Self::UnknownIdentifierColumn {
            column: column.into(),
        }
    }

    /// Creates an invalid result format error.
    pub fn invalid_result_format(message: impl Into<String>) -> Self {
        Self::InvalidResultFormat(message.into())
    }

    /// Creates a missing kwarg error.
    pub fn missing_kwarg(key: impl Into<String>) -> Self {
        Self::MissingKwarg(key.into())
    }

    /// Creates an invalid kwarg error.
    pub fn invalid_kwarg(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKwarg {
            key: key.into(),
            message: message.into(),
        }
    }
}
