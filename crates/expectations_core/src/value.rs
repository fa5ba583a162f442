//! Value model shared by every backend.
//!
//! Values read from an in-process table, an Arrow record batch or a SQL result set
//! are all normalised into [`DataValue`] so that metric results compare equal across
//! backends.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single cell value.
///
/// Serialises untagged, so `DataValue::String("cat")` becomes `"cat"` and
/// `DataValue::Null` becomes `null` in result payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// Null/missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Timestamp value (ISO 8601 string)
    Timestamp(String),
    /// List/array value
    List(Vec<DataValue>),
    /// Map/struct value
    Map(BTreeMap<String, DataValue>),
}

impl DataValue {
    /// Returns true if this value is null.
    ///
    /// NaN is a value, not a missing entry, matching SQL `IS NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "null",
            DataValue::String(_) => "string",
            DataValue::Int(_) => "int64",
            DataValue::Float(_) => "float64",
            DataValue::Bool(_) => "boolean",
            DataValue::Timestamp(_) => "timestamp",
            DataValue::Map(_) => "map",
            DataValue::List(_) => "list",
        }
    }

    /// Attempts to get this value as a string slice.
    ///
    /// Timestamps are returned as their ISO 8601 text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) | DataValue::Timestamp(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to get this value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to get this value as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float(f) => Some(*f),
            DataValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempts to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to get this value as a list.
    pub fn as_list(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::List(values) => Some(values),
            _ => None,
        }
    }

    /// Attempts to interpret this value as a UTC instant.
    ///
    /// Accepts RFC 3339 text, `YYYY-MM-DD HH:MM:SS[.f]` and bare dates.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        let text = self.as_str()?;
        parse_timestamp(text)
    }

    /// Compares two values for range checks.
    ///
    /// Numbers compare numerically across `Int`/`Float`, strings lexically and
    /// timestamps chronologically. Returns `None` for incomparable pairs.
    pub fn partial_cmp_value(&self, other: &DataValue) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Int(a), DataValue::Int(b)) => Some(a.cmp(b)),
            (DataValue::Bool(a), DataValue::Bool(b)) => Some(a.cmp(b)),
            (DataValue::Timestamp(_), _) | (_, DataValue::Timestamp(_)) => {
                let left = self.as_datetime()?;
                let right = other.as_datetime()?;
                Some(left.cmp(&right))
            }
            (DataValue::String(a), DataValue::String(b)) => Some(a.cmp(b)),
            _ => {
                let left = self.as_float()?;
                let right = other.as_float()?;
                // Arrow's ordering: NaN sorts above every number and equals itself.
                Some(left.total_cmp(&right))
            }
        }
    }

    /// Loose equality used by set membership.
    ///
    /// `Int(1)` matches `Float(1.0)`; timestamps match equal strings.
    pub fn loosely_equals(&self, other: &DataValue) -> bool {
        match (self, other) {
            (DataValue::Int(_), DataValue::Float(_)) | (DataValue::Float(_), DataValue::Int(_)) => {
                self.as_float() == other.as_float()
            }
            (DataValue::Timestamp(a), DataValue::String(b))
            | (DataValue::String(a), DataValue::Timestamp(b)) => a == b,
            _ => self == other,
        }
    }
}

/// Parses the timestamp formats accepted by [`DataValue::as_datetime`].
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => true,
            (DataValue::Bool(a), DataValue::Bool(b)) => a == b,
            (DataValue::Int(a), DataValue::Int(b)) => a == b,
            // Bit equality keeps `Eq` and `Hash` consistent.
            (DataValue::Float(a), DataValue::Float(b)) => a.to_bits() == b.to_bits(),
            (DataValue::String(a), DataValue::String(b)) => a == b,
            (DataValue::Timestamp(a), DataValue::Timestamp(b)) => a == b,
            (DataValue::List(a), DataValue::List(b)) => a == b,
            (DataValue::Map(a), DataValue::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            DataValue::Null => {}
            DataValue::Bool(b) => b.hash(state),
            DataValue::Int(i) => i.hash(state),
            DataValue::Float(f) => f.to_bits().hash(state),
            DataValue::String(s) | DataValue::Timestamp(s) => s.hash(state),
            DataValue::List(values) => values.hash(state),
            DataValue::Map(map) => map.hash(state),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "null"),
            DataValue::Bool(b) => write!(f, "{b}"),
            DataValue::Int(i) => write!(f, "{i}"),
            DataValue::Float(v) => write!(f, "{v}"),
            DataValue::String(s) | DataValue::Timestamp(s) => write!(f, "{s}"),
            DataValue::List(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            DataValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::String(s)
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.to_string())
    }
}

impl From<i64> for DataValue {
    fn from(i: i64) -> Self {
        DataValue::Int(i)
    }
}

impl From<i32> for DataValue {
    fn from(i: i32) -> Self {
        DataValue::Int(i as i64)
    }
}

impl From<usize> for DataValue {
    fn from(i: usize) -> Self {
        DataValue::Int(i as i64)
    }
}

impl From<f64> for DataValue {
    fn from(f: f64) -> Self {
        DataValue::Float(f)
    }
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl<T: Into<DataValue>> From<Option<T>> for DataValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DataValue::Null)
    }
}

impl<T: Into<DataValue>> From<Vec<T>> for DataValue {
    fn from(values: Vec<T>) -> Self {
        DataValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DataValue::Null,
            serde_json::Value::Bool(b) => DataValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DataValue::Int(i),
                None => n.as_f64().map(DataValue::Float).unwrap_or(DataValue::Null),
            },
            serde_json::Value::String(s) => DataValue::String(s),
            serde_json::Value::Array(values) => {
                DataValue::List(values.into_iter().map(DataValue::from).collect())
            }
            serde_json::Value::Object(map) => DataValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, DataValue::from(value)))
                    .collect(),
            ),
        }
    }
}

/// A single row keyed by column name.
pub type DataRow = BTreeMap<String, DataValue>;
