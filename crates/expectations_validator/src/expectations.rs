//! Expectation catalog.
//!
//! Maps expectation type names onto the column map metric that checks them and the
//! expectation kwargs that parametrise the condition.

use crate::providers::{BETWEEN, IN_SET, MATCH_REGEX, NONNULL, NOT_IN_SET, NULL};
use expectations_core::{ConfigurationError, DataValue, ExpectationConfiguration, Kwargs};
use std::collections::BTreeMap;

/// A column map expectation: a type name bound to a map metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapExpectation {
    expectation_type: String,
    map_metric: String,
    filter_column_isnull: bool,
    condition_kwargs: Vec<String>,
}

impl ColumnMapExpectation {
    /// Binds `expectation_type` to the map metric `map_metric`.
    ///
    /// `filter_column_isnull` must agree with the registered metric: when true, nulls
    /// are reported as missing instead of unexpected.
    pub fn new<I, S>(
        expectation_type: impl Into<String>,
        map_metric: impl Into<String>,
        filter_column_isnull: bool,
        condition_kwargs: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expectation_type: expectation_type.into(),
            map_metric: map_metric.into(),
            filter_column_isnull,
            condition_kwargs: condition_kwargs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn expectation_type(&self) -> &str {
        &self.expectation_type
    }

    pub fn map_metric(&self) -> &str {
        &self.map_metric
    }

    pub fn filter_column_isnull(&self) -> bool {
        self.filter_column_isnull
    }

    /// Value kwargs of the condition, taken from the expectation kwargs.
    ///
    /// Absent and null kwargs are left out so that they do not split metric identity.
    pub fn value_kwargs(&self, config: &ExpectationConfiguration) -> Kwargs {
        let mut kwargs = Kwargs::new();
        for key in &self.condition_kwargs {
            match config.kwargs.get(key) {
                None | Some(DataValue::Null) => {}
                Some(value) => kwargs.insert(key.as_str(), value.clone()),
            }
        }
        kwargs
    }
}

/// Known expectation types.
#[derive(Debug, Clone)]
pub struct ExpectationCatalog {
    entries: BTreeMap<String, ColumnMapExpectation>,
}

impl Default for ExpectationCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExpectationCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Catalog with the built-in column map expectations.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for expectation in [
            ColumnMapExpectation::new("expect_column_values_to_be_in_set", IN_SET, true, ["value_set"]),
            ColumnMapExpectation::new(
                "expect_column_values_to_not_be_in_set",
                NOT_IN_SET,
                true,
                ["value_set"],
            ),
            ColumnMapExpectation::new(
                "expect_column_values_to_not_be_null",
                NONNULL,
                false,
                Vec::<String>::new(),
            ),
            ColumnMapExpectation::new(
                "expect_column_values_to_be_null",
                NULL,
                false,
                Vec::<String>::new(),
            ),
            ColumnMapExpectation::new(
                "expect_column_values_to_be_between",
                BETWEEN,
                true,
                ["min_value", "max_value", "strict_min", "strict_max"],
            ),
            ColumnMapExpectation::new(
                "expect_column_values_to_match_regex",
                MATCH_REGEX,
                true,
                ["regex"],
            ),
        ] {
            catalog.register(expectation);
        }
        catalog
    }

    /// Adds or replaces an expectation type.
    pub fn register(&mut self, expectation: ColumnMapExpectation) {
        self.entries
            .insert(expectation.expectation_type.clone(), expectation);
    }

    /// Looks up an expectation type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownExpectationType`] for unknown types.
    pub fn get(&self, expectation_type: &str) -> Result<&ColumnMapExpectation, ConfigurationError> {
        self.entries
            .get(expectation_type)
            .ok_or_else(|| ConfigurationError::UnknownExpectationType(expectation_type.to_string()))
    }

    pub fn expectation_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
