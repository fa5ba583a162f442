//! Validation context and result types.
//!
//! The context carries run-level options (`catch_exceptions`, the run-level result
//! format, metadata). Results mirror what an expectation run reports back: one
//! [`ExpectationValidationResult`] per expectation plus suite statistics.

use crate::{ExpectationConfiguration, ExpectationResultPayload, ResultFormatSpec};
use serde::Serialize;
use std::collections::BTreeMap;

/// Context for validation operations.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Embed metric failures in results instead of returning them as errors
    pub catch_exceptions: bool,

    /// Run-level result format, used when an expectation has none
    pub result_format: Option<ResultFormatSpec>,

    /// Additional metadata for the validation
    pub metadata: BTreeMap<String, String>,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self {
            catch_exceptions: true,
            result_format: None,
            metadata: BTreeMap::new(),
        }
    }
}

impl ValidationContext {
    /// Creates a new validation context with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `catch_exceptions`.
    pub fn with_catch_exceptions(mut self, catch_exceptions: bool) -> Self {
        self.catch_exceptions = catch_exceptions;
        self
    }

    /// Sets the run-level result format.
    pub fn with_result_format(mut self, result_format: ResultFormatSpec) -> Self {
        self.result_format = Some(result_format);
        self
    }

    /// Adds metadata to the context.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Details of a failure embedded in a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExceptionInfo {
    /// Whether a failure was caught
    pub raised_exception: bool,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    /// Metrics that could not be resolved
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_metrics: Vec<String>,
}

impl ExceptionInfo {
    /// Creates an exception record.
    pub fn raised(message: impl Into<String>, failed_metrics: Vec<String>) -> Self {
        Self {
            raised_exception: true,
            exception_message: Some(message.into()),
            failed_metrics,
        }
    }
}

/// Outcome of one expectation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectationValidationResult {
    /// Whether the expectation held
    pub success: bool,
    /// The configuration that was validated
    pub expectation_config: ExpectationConfiguration,
    /// Result payload shaped by the result format
    pub result: ExpectationResultPayload,
    /// Caught failure, if any
    pub exception_info: ExceptionInfo,
}

impl ExpectationValidationResult {
    /// Creates a failed result carrying a caught exception.
    pub fn from_exception(
        expectation_config: ExpectationConfiguration,
        exception_info: ExceptionInfo,
    ) -> Self {
        Self {
            success: false,
            expectation_config,
            result: ExpectationResultPayload::default(),
            exception_info,
        }
    }
}

/// Statistics about a validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationStatistics {
    /// Number of expectations evaluated
    pub evaluated_expectations: usize,
    /// Number that succeeded
    pub successful_expectations: usize,
    /// Number that failed
    pub unsuccessful_expectations: usize,
    /// Share that succeeded, null when nothing ran
    pub success_percent: Option<f64>,
    /// Number of distinct metrics resolved
    pub metrics_resolved: usize,
    /// Validation duration in milliseconds
    pub duration_ms: u64,
}

/// Report of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteValidationResult {
    /// Whether every expectation succeeded
    pub success: bool,
    /// Per-expectation results, in input order
    pub results: Vec<ExpectationValidationResult>,
    /// Run statistics
    pub statistics: ValidationStatistics,
    /// Context metadata
    pub meta: BTreeMap<String, String>,
}

impl SuiteValidationResult {
    /// Builds a report, deriving the success flag and counters from `results`.
    pub fn new(
        results: Vec<ExpectationValidationResult>,
        metrics_resolved: usize,
        duration_ms: u64,
        meta: BTreeMap<String, String>,
    ) -> Self {
        let evaluated = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let success_percent = if evaluated == 0 {
            None
        } else {
            Some(successful as f64 / evaluated as f64 * 100.0)
        };

        Self {
            success: successful == evaluated,
            results,
            statistics: ValidationStatistics {
                evaluated_expectations: evaluated,
                successful_expectations: successful,
                unsuccessful_expectations: evaluated - successful,
                success_percent,
                metrics_resolved,
                duration_ms,
            },
            meta,
        }
    }
}
