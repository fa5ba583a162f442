//! Metric configurations: the nodes of the dependency graph.
//!
//! A [`MetricConfiguration`] names a statistic (`column_values.in_set.unexpected_count`,
//! `table.row_count`, ...) together with the domain it is computed over and the value
//! parameters that shape it. Identity is structural: two configurations built from the
//! same name and equal kwargs are the same graph node, whatever order the kwargs were
//! inserted in.

use crate::{ConfigurationError, DataValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Domain kwarg naming the batch a domain belongs to.
pub const BATCH_ID_KWARG: &str = "batch_id";

/// Domain kwarg naming the column of a column domain.
pub const COLUMN_KWARG: &str = "column";

/// An ordered keyword-argument mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kwargs(BTreeMap<String, DataValue>);

impl Kwargs {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts an entry, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a copy without `key`.
    pub fn without(&self, key: &str) -> Self {
        let mut copy = self.clone();
        copy.0.remove(key);
        copy
    }

    /// Looks up a value.
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.0.get(key)
    }

    /// Returns true if `key` is present and not null.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_null())
    }

    /// Looks up a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(DataValue::as_str)
    }

    /// Looks up a required string value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingKwarg`] if the key is absent or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, ConfigurationError> {
        self.get_str(key)
            .ok_or_else(|| ConfigurationError::missing_kwarg(key))
    }

    /// Looks up an optional non-negative integer, such as a `limit`.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key)
            .and_then(DataValue::as_int)
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Looks up an optional list of strings, such as identifier column names.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        let values = self.get(key)?.as_list()?;
        values
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataValue)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical text form used for identity.
    ///
    /// Keys are sorted by the underlying `BTreeMap`, so insertion order never leaks
    /// into the id.
    pub fn to_id(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl FromIterator<(String, DataValue)> for Kwargs {
    fn from_iter<T: IntoIterator<Item = (String, DataValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Structural identity of a [`MetricConfiguration`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricConfigurationId {
    /// Metric name
    pub metric_name: String,
    /// Canonical domain kwargs
    pub domain_id: String,
    /// Canonical value kwargs
    pub value_id: String,
}

/// A request for one statistic over one domain.
///
/// # Example
///
/// ```rust
/// use expectations_core::{Kwargs, MetricConfiguration};
///
/// let a = MetricConfiguration::new(
///     "column_values.in_set.unexpected_count",
///     Kwargs::new().with("batch_id", "b1").with("column", "animals"),
///     Kwargs::new().with("value_set", vec!["cat", "dog"]),
/// );
/// let b = MetricConfiguration::new(
///     "column_values.in_set.unexpected_count",
///     Kwargs::new().with("column", "animals").with("batch_id", "b1"),
///     Kwargs::new().with("value_set", vec!["cat", "dog"]),
/// );
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct MetricConfiguration {
    metric_name: String,
    metric_domain_kwargs: Kwargs,
    metric_value_kwargs: Kwargs,
    #[serde(skip)]
    id: MetricConfigurationId,
}

impl MetricConfiguration {
    /// Creates a configuration and computes its identity.
    pub fn new(
        metric_name: impl Into<String>,
        metric_domain_kwargs: Kwargs,
        metric_value_kwargs: Kwargs,
    ) -> Self {
        let metric_name = metric_name.into();
        let id = MetricConfigurationId {
            metric_name: metric_name.clone(),
            domain_id: metric_domain_kwargs.to_id(),
            value_id: metric_value_kwargs.to_id(),
        };
        Self {
            metric_name,
            metric_domain_kwargs,
            metric_value_kwargs,
            id,
        }
    }

    /// Metric name.
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Domain kwargs.
    pub fn domain_kwargs(&self) -> &Kwargs {
        &self.metric_domain_kwargs
    }

    /// Value kwargs.
    pub fn value_kwargs(&self) -> &Kwargs {
        &self.metric_value_kwargs
    }

    /// Structural identity.
    pub fn id(&self) -> &MetricConfigurationId {
        &self.id
    }

    /// Batch the domain belongs to, if recorded.
    pub fn batch_id(&self) -> Option<&str> {
        self.metric_domain_kwargs.get_str(BATCH_ID_KWARG)
    }

    /// Column of a column domain.
    pub fn column(&self) -> Option<&str> {
        self.metric_domain_kwargs.get_str(COLUMN_KWARG)
    }

    /// Returns a configuration with the same domain and a different name and value
    /// kwargs. Used by providers declaring dependencies on sibling metrics.
    pub fn sibling(&self, metric_name: impl Into<String>, value_kwargs: Kwargs) -> Self {
        Self::new(metric_name, self.metric_domain_kwargs.clone(), value_kwargs)
    }

    /// Returns a table-domain configuration over the same batch.
    pub fn table_metric(&self, metric_name: impl Into<String>) -> Self {
        Self::new(
            metric_name,
            self.metric_domain_kwargs.without(COLUMN_KWARG),
            Kwargs::new(),
        )
    }
}

impl PartialEq for MetricConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MetricConfiguration {}

impl Hash for MetricConfiguration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MetricConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metric_name)?;
        if !self.metric_domain_kwargs.is_empty() {
            write!(f, " domain={}", self.id.domain_id)?;
        }
        if !self.metric_value_kwargs.is_empty() {
            write!(f, " value={}", self.id.value_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn domain() -> Kwargs {
        Kwargs::new().with("batch_id", "b1").with("column", "animals")
    }

    #[test]
    fn test_identity_ignores_insertion_order() {
        let a = MetricConfiguration::new(
            "m",
            domain(),
            Kwargs::new().with("x", 1i64).with("y", 2i64),
        );
        let b = MetricConfiguration::new(
            "m",
            Kwargs::new().with("column", "animals").with("batch_id", "b1"),
            Kwargs::new().with("y", 2i64).with("x", 1i64),
        );
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_value_kwargs_distinguish_nodes() {
        let a = MetricConfiguration::new("m", domain(), Kwargs::new().with("limit", 20i64));
        let b = MetricConfiguration::new("m", domain(), Kwargs::new());
        assert_ne!(a, b);
    }

    #[test]
    fn test_table_metric_drops_column() {
        let metric = MetricConfiguration::new("m", domain(), Kwargs::new());
        assert_eq!(metric.column(), Some("animals"));

        let table = metric.table_metric("table.row_count");
        assert_eq!(table.batch_id(), Some("b1"));
        assert_eq!(table.column(), None);
    }

    #[test]
    fn test_kwargs_helpers() {
        let kwargs = Kwargs::new()
            .with("limit", 5i64)
            .with("names", vec!["pk_1", "pk_2"])
            .with("nothing", DataValue::Null);
        assert_eq!(kwargs.get_usize("limit"), Some(5));
        assert_eq!(
            kwargs.get_str_list("names"),
            Some(vec!["pk_1".to_string(), "pk_2".to_string()])
        );
        assert!(!kwargs.contains("nothing"));
        assert!(kwargs.require_str("limit").is_err());
    }
}
