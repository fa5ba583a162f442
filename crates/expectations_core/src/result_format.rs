//! Result format configuration.
//!
//! Callers may pass a bare level string (`"SUMMARY"`) or a structured object. Both are
//! normalised here, once, into a fully-defaulted [`ResultFormat`]; nothing downstream
//! ever looks at the raw form again.

use crate::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default cap on partial lists.
pub const DEFAULT_PARTIAL_UNEXPECTED_COUNT: usize = 20;

/// Verbosity level. Ordered: each level is a superset of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultFormatLevel {
    /// Success flag only
    BooleanOnly,
    /// Counts, percentages and a capped sample of unexpected values
    #[default]
    Basic,
    /// Basic plus value counts and a capped index list
    Summary,
    /// Everything, untruncated
    Complete,
}

impl ResultFormatLevel {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormatLevel::BooleanOnly => "BOOLEAN_ONLY",
            ResultFormatLevel::Basic => "BASIC",
            ResultFormatLevel::Summary => "SUMMARY",
            ResultFormatLevel::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for ResultFormatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultFormatLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOOLEAN_ONLY" => Ok(ResultFormatLevel::BooleanOnly),
            "BASIC" => Ok(ResultFormatLevel::Basic),
            "SUMMARY" => Ok(ResultFormatLevel::Summary),
            "COMPLETE" => Ok(ResultFormatLevel::Complete),
            other => Err(ConfigurationError::invalid_result_format(format!(
                "unknown level '{other}', expected one of BOOLEAN_ONLY, BASIC, SUMMARY, COMPLETE"
            ))),
        }
    }
}

/// Raw, user-supplied result format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultFormatSpec {
    /// Bare level string, e.g. `"COMPLETE"`
    Level(String),
    /// Structured object
    Detailed(DetailedResultFormat),
}

/// Structured result format as written by the user. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedResultFormat {
    /// Level name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_format: Option<String>,
    /// Cap on partial lists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_unexpected_count: Option<i64>,
    /// Identifier columns for the unexpected index list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unexpected_index_column_names: Option<Vec<String>>,
    /// Whether to return the full unexpected rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_unexpected_rows: Option<bool>,
    /// Whether to return the audit query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_unexpected_index_query: Option<bool>,
}

/// Fully-defaulted result format.
///
/// # Example
///
/// ```rust
/// use expectations_core::{ResultFormat, ResultFormatLevel, ResultFormatSpec};
///
/// let format = ResultFormat::normalize(&ResultFormatSpec::Level("summary".into())).unwrap();
/// assert_eq!(format.level, ResultFormatLevel::Summary);
/// assert_eq!(format.partial_unexpected_count, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultFormat {
    /// Verbosity level
    pub level: ResultFormatLevel,
    /// Cap on partial lists (BASIC and above)
    pub partial_unexpected_count: usize,
    /// Identifier columns, in order
    pub unexpected_index_column_names: Option<Vec<String>>,
    /// Return full unexpected rows at COMPLETE
    pub include_unexpected_rows: bool,
    /// Return the audit query at COMPLETE
    pub return_unexpected_index_query: bool,
}

impl Default for ResultFormat {
    fn default() -> Self {
        Self::from_level(ResultFormatLevel::default())
    }
}

impl ResultFormat {
    /// Creates a result format with default options at `level`.
    pub fn from_level(level: ResultFormatLevel) -> Self {
        Self {
            level,
            partial_unexpected_count: DEFAULT_PARTIAL_UNEXPECTED_COUNT,
            unexpected_index_column_names: None,
            include_unexpected_rows: false,
            return_unexpected_index_query: true,
        }
    }

    /// Normalises a raw result format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] for unknown levels, negative counts, an empty
    /// identifier list, or `include_unexpected_rows` without an explicit level.
    pub fn normalize(spec: &ResultFormatSpec) -> Result<Self> {
        Self::normalize_with_flags(Some(spec), None)
    }

    /// Normalises a raw result format together with a detail flag supplied next to it
    /// (for example as an expectation kwarg).
    ///
    /// Detail flags require the structured form: pairing `include_unexpected_rows`
    /// with a bare level string, or with an object that does not name its level, is
    /// rejected.
    pub fn normalize_with_flags(
        spec: Option<&ResultFormatSpec>,
        include_unexpected_rows: Option<bool>,
    ) -> Result<Self> {
        let detailed = match spec {
            None => {
                if include_unexpected_rows.is_some() {
                    return Err(ConfigurationError::DetailFlagRequiresStructuredFormat {
                        flag: "include_unexpected_rows".to_string(),
                    });
                }
                return Ok(Self::default());
            }
            Some(ResultFormatSpec::Level(level)) => {
                if include_unexpected_rows.is_some() {
                    return Err(ConfigurationError::DetailFlagRequiresStructuredFormat {
                        flag: "include_unexpected_rows".to_string(),
                    });
                }
                return Ok(Self::from_level(level.parse()?));
            }
            Some(ResultFormatSpec::Detailed(detailed)) => detailed,
        };

        let include_rows = match (detailed.include_unexpected_rows, include_unexpected_rows) {
            (Some(a), Some(b)) if a != b => {
                return Err(ConfigurationError::invalid_result_format(
                    "conflicting include_unexpected_rows values",
                ));
            }
            (a, b) => a.or(b),
        };

        let level = match &detailed.result_format {
            Some(level) => level.parse()?,
            None if include_rows.is_some() => {
                return Err(ConfigurationError::DetailFlagRequiresStructuredFormat {
                    flag: "include_unexpected_rows".to_string(),
                });
            }
            None => ResultFormatLevel::default(),
        };

        let partial_unexpected_count = match detailed.partial_unexpected_count {
            Some(count) => usize::try_from(count).map_err(|_| {
                ConfigurationError::invalid_result_format(format!(
                    "partial_unexpected_count must be non-negative, got {count}"
                ))
            })?,
            None => DEFAULT_PARTIAL_UNEXPECTED_COUNT,
        };

        if let Some(names) = &detailed.unexpected_index_column_names {
            if names.is_empty() {
                return Err(ConfigurationError::invalid_result_format(
                    "unexpected_index_column_names must not be empty",
                ));
            }
        }

        Ok(Self {
            level,
            partial_unexpected_count,
            unexpected_index_column_names: detailed.unexpected_index_column_names.clone(),
            include_unexpected_rows: include_rows.unwrap_or(false),
            return_unexpected_index_query: detailed.return_unexpected_index_query.unwrap_or(true),
        })
    }

    /// Sets the partial list cap.
    pub fn with_partial_unexpected_count(mut self, count: usize) -> Self {
        self.partial_unexpected_count = count;
        self
    }

    /// Sets the identifier columns.
    pub fn with_unexpected_index_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unexpected_index_column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets `include_unexpected_rows`.
    pub fn with_include_unexpected_rows(mut self, include: bool) -> Self {
        self.include_unexpected_rows = include;
        self
    }

    /// Sets `return_unexpected_index_query`.
    pub fn with_return_unexpected_index_query(mut self, include: bool) -> Self {
        self.return_unexpected_index_query = include;
        self
    }

    /// Returns true if the level is at least `level`.
    pub fn at_least(&self, level: ResultFormatLevel) -> bool {
        self.level >= level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detailed(json: serde_json::Value) -> ResultFormatSpec {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_level_ordering() {
        assert!(ResultFormatLevel::BooleanOnly < ResultFormatLevel::Basic);
        assert!(ResultFormatLevel::Basic < ResultFormatLevel::Summary);
        assert!(ResultFormatLevel::Summary < ResultFormatLevel::Complete);
    }

    #[test]
    fn test_bare_string_defaults() {
        let format = ResultFormat::normalize(&ResultFormatSpec::Level("COMPLETE".into())).unwrap();
        assert_eq!(format, ResultFormat::from_level(ResultFormatLevel::Complete));
        assert!(format.return_unexpected_index_query);
        assert!(!format.include_unexpected_rows);
    }

    #[test]
    fn test_structured_object() {
        let spec = detailed(serde_json::json!({
            "result_format": "SUMMARY",
            "partial_unexpected_count": 1,
            "unexpected_index_column_names": ["pk_1"],
        }));
        let format = ResultFormat::normalize(&spec).unwrap();
        assert_eq!(format.level, ResultFormatLevel::Summary);
        assert_eq!(format.partial_unexpected_count, 1);
        assert_eq!(
            format.unexpected_index_column_names,
            Some(vec!["pk_1".to_string()])
        );
    }

    #[test]
    fn test_unknown_level_rejected() {
        let err = ResultFormat::normalize(&ResultFormatSpec::Level("VERBOSE".into())).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidResultFormat(_)));
    }

    #[test]
    fn test_include_rows_with_bare_level_rejected() {
        let err = ResultFormat::normalize_with_flags(
            Some(&ResultFormatSpec::Level("COMPLETE".into())),
            Some(true),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::DetailFlagRequiresStructuredFormat { .. }
        ));
    }

    #[test]
    fn test_include_rows_without_level_rejected() {
        let spec = detailed(serde_json::json!({"include_unexpected_rows": false}));
        assert!(ResultFormat::normalize(&spec).is_err());
    }

    #[test]
    fn test_include_rows_with_level_accepted() {
        let spec = detailed(serde_json::json!({
            "result_format": "COMPLETE",
            "include_unexpected_rows": true,
        }));
        let format = ResultFormat::normalize(&spec).unwrap();
        assert!(format.include_unexpected_rows);
    }

    #[test]
    fn test_negative_count_rejected() {
        let spec = detailed(serde_json::json!({
            "result_format": "BASIC",
            "partial_unexpected_count": -1,
        }));
        assert!(ResultFormat::normalize(&spec).is_err());
    }

    #[test]
    fn test_object_without_level_defaults_to_basic() {
        let spec = detailed(serde_json::json!({"partial_unexpected_count": 3}));
        let format = ResultFormat::normalize(&spec).unwrap();
        assert_eq!(format.level, ResultFormatLevel::Basic);
        assert_eq!(format.partial_unexpected_count, 3);
    }
}
