//! Expectation result payload types.
//!
//! The payload is a typed struct with optional fields; a field is serialised only
//! when the result format policy populated it, so the serialised keys are exactly the
//! ones selected for the requested level.

use crate::{DataRow, DataValue};
use serde::Serialize;

/// One entry of an unexpected index list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UnexpectedIndexEntry {
    /// Positional row index (in-process batches without identifiers only)
    Position(usize),
    /// Domain column plus identifying columns for one unexpected row
    Record(DataRow),
}

/// Audit query reproducing the unexpected rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UnexpectedIndexQuery {
    /// Runnable query text (relational) or filter expression (distributed)
    Text(String),
    /// Literal ordered sequence of positional or index values (in-process)
    Indices(Vec<DataValue>),
}

impl UnexpectedIndexQuery {
    /// Query text, if this is a textual query.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            UnexpectedIndexQuery::Text(text) => Some(text),
            UnexpectedIndexQuery::Indices(_) => None,
        }
    }
}

/// Count of one distinct unexpected value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialUnexpectedCount {
    /// The value
    pub value: DataValue,
    /// Number of unexpected rows holding it
    pub count: usize,
}

/// Result payload of a column map expectation.
///
/// Percentages are `Option<Option<f64>>`: the outer option says whether the field is
/// part of the payload, the inner one is `None` (serialised as `null`) when the
/// denominator is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpectationResultPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_percent: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_percent: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_percent_total: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_percent_nonmissing: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_unexpected_list: Option<Vec<DataValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_unexpected_counts: Option<Vec<PartialUnexpectedCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_unexpected_index_list: Option<Vec<UnexpectedIndexEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_list: Option<Vec<DataValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_index_list: Option<Vec<UnexpectedIndexEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_index_query: Option<UnexpectedIndexQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_rows: Option<Vec<DataRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_index_column_names: Option<Vec<String>>,
}

impl ExpectationResultPayload {
    /// Names of the populated fields, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if nothing is populated (BOOLEAN_ONLY).
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
