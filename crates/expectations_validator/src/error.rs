//! Error types for metric resolution and validation.

use expectations_core::ConfigurationError;
use thiserror::Error;

/// Result type for metric computation.
pub type MetricResult<T> = std::result::Result<T, ValidationError>;

/// Errors that can occur while resolving metrics or validating a batch.
///
/// Every variant is `Clone` so a single failure can be recorded against each graph
/// node it blocks.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// The request can never succeed; always surfaced to the caller
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// No implementation registered for a metric on a backend
    #[error("No provider found for metric '{metric_name}' on backend '{backend}'")]
    ProviderNotFound { metric_name: String, backend: String },

    /// A metric could not be computed
    #[error("Failed to resolve metric '{metric_name}': {message}")]
    MetricResolution {
        metric_name: String,
        message: String,
    },

    /// A dependency failed, so this metric was never attempted
    #[error("Metric '{metric_name}' was not resolved because its dependency '{upstream}' failed")]
    UpstreamFailed {
        metric_name: String,
        upstream: String,
    },

    /// Column metadata could not be obtained, even through a sample query
    #[error("Failed to introspect columns of '{relation}': {message}")]
    BackendIntrospection { relation: String, message: String },

    /// Error raised by an execution backend
    #[error("Backend error: {0}")]
    Backend(String),
}

impl ValidationError {
    /// Creates a new metric resolution error.
    pub fn metric(metric_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetricResolution {
            metric_name: metric_name.into(),
            message: message.into(),
        }
    }

    /// Creates a new provider-not-found error.
    pub fn provider_not_found(metric_name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::ProviderNotFound {
            metric_name: metric_name.into(),
            backend: backend.into(),
        }
    }

    /// Creates a new upstream failure marker.
    pub fn upstream(metric_name: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self::UpstreamFailed {
            metric_name: metric_name.into(),
            upstream: upstream.into(),
        }
    }

    /// Creates a new introspection error.
    pub fn introspection(relation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendIntrospection {
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Creates a new backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns true for errors that must abort a run regardless of
    /// `catch_exceptions`.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Attaches a metric name to errors that do not carry one yet.
    pub fn for_metric(self, metric_name: &str) -> Self {
        match self {
            Self::Backend(message) => Self::metric(metric_name, message),
            Self::BackendIntrospection { relation, message } => {
                Self::metric(metric_name, format!("introspection of '{relation}' failed: {message}"))
            }
            other => other,
        }
    }
}

impl From<datafusion::error::DataFusionError> for ValidationError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<arrow_schema::ArrowError> for ValidationError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<regex::Error> for ValidationError {
    fn from(err: regex::Error) -> Self {
        Self::Configuration(ConfigurationError::invalid_kwarg("regex", err.to_string()))
    }
}
