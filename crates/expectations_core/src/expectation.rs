//! Expectation configuration.
//!
//! An expectation is a declarative assertion about a batch, identified by its type
//! name (`expect_column_values_to_be_in_set`, ...) and parametrised by kwargs.

use crate::{ConfigurationError, DataValue, Kwargs, Result, ResultFormat, ResultFormatSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kwarg holding the `mostly` threshold.
pub const MOSTLY_KWARG: &str = "mostly";

/// Kwarg holding a detail flag that must be paired with a structured result format.
pub const INCLUDE_UNEXPECTED_ROWS_KWARG: &str = "include_unexpected_rows";

/// A single expectation as declared by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationConfiguration {
    /// Expectation type name
    #[serde(rename = "type", alias = "expectation_type")]
    pub expectation_type: String,

    /// Expectation parameters (`column`, `value_set`, `mostly`, ...)
    #[serde(default)]
    pub kwargs: Kwargs,

    /// Per-expectation result format, overriding the run-level one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_format: Option<ResultFormatSpec>,

    /// Free-form metadata echoed into results
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, DataValue>,
}

impl ExpectationConfiguration {
    /// Creates a configuration with no kwargs.
    pub fn new(expectation_type: impl Into<String>) -> Self {
        Self {
            expectation_type: expectation_type.into(),
            kwargs: Kwargs::new(),
            result_format: None,
            meta: BTreeMap::new(),
        }
    }

    /// Column the expectation applies to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingKwarg`] if `column` is absent.
    pub fn column(&self) -> Result<&str> {
        self.kwargs.require_str(crate::COLUMN_KWARG)
    }

    /// The `mostly` threshold, defaulting to 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidMostly`] if the value lies outside [0, 1].
    pub fn mostly(&self) -> Result<f64> {
        match self.kwargs.get(MOSTLY_KWARG) {
            None | Some(DataValue::Null) => Ok(1.0),
            Some(value) => {
                let mostly = value.as_float().ok_or_else(|| {
                    ConfigurationError::invalid_kwarg(MOSTLY_KWARG, "must be a number")
                })?;
                if (0.0..=1.0).contains(&mostly) {
                    Ok(mostly)
                } else {
                    Err(ConfigurationError::InvalidMostly(mostly))
                }
            }
        }
    }

    /// Resolves the effective result format.
    ///
    /// The expectation's own `result_format` wins over `run_level`. The
    /// `include_unexpected_rows` kwarg, when present, is validated together with
    /// whichever raw form is in effect.
    pub fn effective_result_format(
        &self,
        run_level: Option<&ResultFormatSpec>,
    ) -> Result<ResultFormat> {
        let include_rows = match self.kwargs.get(INCLUDE_UNEXPECTED_ROWS_KWARG) {
            None | Some(DataValue::Null) => None,
            Some(value) => Some(value.as_bool().ok_or_else(|| {
                ConfigurationError::invalid_kwarg(INCLUDE_UNEXPECTED_ROWS_KWARG, "must be a boolean")
            })?),
        };
        let spec = self.result_format.as_ref().or(run_level);
        ResultFormat::normalize_with_flags(spec, include_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultFormatLevel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mostly_defaults_and_bounds() {
        let mut config = ExpectationConfiguration::new("expect_column_values_to_not_be_null");
        assert_eq!(config.mostly().unwrap(), 1.0);

        config.kwargs.insert(MOSTLY_KWARG, 0.5);
        assert_eq!(config.mostly().unwrap(), 0.5);

        config.kwargs.insert(MOSTLY_KWARG, 1.5);
        assert_eq!(config.mostly(), Err(ConfigurationError::InvalidMostly(1.5)));
    }

    #[test]
    fn test_expectation_result_format_overrides_run_level() {
        let mut config = ExpectationConfiguration::new("expect_column_values_to_be_in_set");
        config.result_format = Some(ResultFormatSpec::Level("SUMMARY".into()));
        let run_level = ResultFormatSpec::Level("COMPLETE".into());

        let format = config.effective_result_format(Some(&run_level)).unwrap();
        assert_eq!(format.level, ResultFormatLevel::Summary);
    }

    #[test]
    fn test_include_rows_kwarg_with_bare_level_rejected() {
        let mut config = ExpectationConfiguration::new("expect_column_values_to_be_in_set");
        config.kwargs.insert(INCLUDE_UNEXPECTED_ROWS_KWARG, true);
        config.result_format = Some(ResultFormatSpec::Level("COMPLETE".into()));
        assert!(config.effective_result_format(None).is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: ExpectationConfiguration = serde_json::from_value(serde_json::json!({
            "type": "expect_column_values_to_be_in_set",
            "kwargs": {"column": "animals", "value_set": ["cat", "fish", "dog"]},
            "result_format": {"result_format": "COMPLETE", "unexpected_index_column_names": ["pk_1"]}
        }))
        .unwrap();
        assert_eq!(config.column().unwrap(), "animals");
        assert_eq!(
            config.kwargs.get("value_set"),
            Some(&DataValue::from(vec!["cat", "fish", "dog"]))
        );
        assert!(matches!(config.result_format, Some(ResultFormatSpec::Detailed(_))));
    }
}
