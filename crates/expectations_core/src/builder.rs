//! Builder pattern for creating expectation configurations.
//!
//! This module provides ergonomic builders for constructing expectations with a
//! fluent API.

use crate::{
    DataValue, DetailedResultFormat, ExpectationConfiguration, Kwargs, ResultFormatSpec,
    COLUMN_KWARG, MOSTLY_KWARG,
};

/// Builder for creating an `ExpectationConfiguration`.
///
/// # Example
///
/// ```rust
/// use expectations_core::ExpectationBuilder;
///
/// let expectation = ExpectationBuilder::in_set("animals", vec!["cat", "fish", "dog"])
///     .mostly(0.9)
///     .result_format("COMPLETE")
///     .build();
///
/// assert_eq!(expectation.expectation_type, "expect_column_values_to_be_in_set");
/// assert_eq!(expectation.column().unwrap(), "animals");
/// ```
#[derive(Debug)]
pub struct ExpectationBuilder {
    expectation_type: String,
    kwargs: Kwargs,
    result_format: Option<ResultFormatSpec>,
}

impl ExpectationBuilder {
    /// Creates a builder for any expectation type.
    pub fn new(expectation_type: impl Into<String>) -> Self {
        Self {
            expectation_type: expectation_type.into(),
            kwargs: Kwargs::new(),
            result_format: None,
        }
    }

    /// `expect_column_values_to_be_in_set`.
    pub fn in_set<V: Into<DataValue>>(column: impl Into<String>, value_set: Vec<V>) -> Self {
        Self::new("expect_column_values_to_be_in_set")
            .column(column)
            .kwarg("value_set", value_set)
    }

    /// `expect_column_values_to_not_be_in_set`.
    pub fn not_in_set<V: Into<DataValue>>(column: impl Into<String>, value_set: Vec<V>) -> Self {
        Self::new("expect_column_values_to_not_be_in_set")
            .column(column)
            .kwarg("value_set", value_set)
    }

    /// `expect_column_values_to_not_be_null`.
    pub fn not_null(column: impl Into<String>) -> Self {
        Self::new("expect_column_values_to_not_be_null").column(column)
    }

    /// `expect_column_values_to_be_null`.
    pub fn null(column: impl Into<String>) -> Self {
        Self::new("expect_column_values_to_be_null").column(column)
    }

    /// `expect_column_values_to_be_between`. Either bound may be null.
    pub fn between(
        column: impl Into<String>,
        min_value: impl Into<DataValue>,
        max_value: impl Into<DataValue>,
    ) -> Self {
        Self::new("expect_column_values_to_be_between")
            .column(column)
            .kwarg("min_value", min_value)
            .kwarg("max_value", max_value)
    }

    /// `expect_column_values_to_match_regex`.
    pub fn match_regex(column: impl Into<String>, regex: impl Into<String>) -> Self {
        Self::new("expect_column_values_to_match_regex")
            .column(column)
            .kwarg("regex", regex.into())
    }

    /// Sets the target column.
    pub fn column(self, column: impl Into<String>) -> Self {
        self.kwarg(COLUMN_KWARG, column.into())
    }

    /// Sets the `mostly` threshold.
    pub fn mostly(self, mostly: f64) -> Self {
        self.kwarg(MOSTLY_KWARG, mostly)
    }

    /// Sets an arbitrary kwarg.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.kwargs.insert(key, value);
        self
    }

    /// Sets the result format as a bare level string.
    pub fn result_format(mut self, level: impl Into<String>) -> Self {
        self.result_format = Some(ResultFormatSpec::Level(level.into()));
        self
    }

    /// Sets the result format as a structured object.
    pub fn detailed_result_format(mut self, format: DetailedResultFormat) -> Self {
        self.result_format = Some(ResultFormatSpec::Detailed(format));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ExpectationConfiguration {
        let mut config = ExpectationConfiguration::new(self.expectation_type);
        config.kwargs = self.kwargs;
        config.result_format = self.result_format;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_between_builder() {
        let config = ExpectationBuilder::between("age", 0i64, DataValue::Null).build();
        assert_eq!(config.kwargs.get("min_value"), Some(&DataValue::Int(0)));
        assert_eq!(config.kwargs.get("max_value"), Some(&DataValue::Null));
    }

    #[test]
    fn test_detailed_result_format() {
        let config = ExpectationBuilder::not_null("id")
            .detailed_result_format(DetailedResultFormat {
                result_format: Some("SUMMARY".into()),
                partial_unexpected_count: Some(5),
                ..Default::default()
            })
            .build();
        let format = config.effective_result_format(None).unwrap();
        assert_eq!(format.partial_unexpected_count, 5);
    }
}
