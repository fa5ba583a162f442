//! Metric provider registry.
//!
//! A provider is the implementation of one metric on one [`BackendKind`]. Providers
//! declare their upstream dependencies as labelled [`MetricConfiguration`]s and either
//! compute a [`MetricValue`] directly or hand the backend an aggregate partial to be
//! fused with others in one physical pass.

use crate::execution::{AggregateRequest, BackendKind, ColumnMetadata, ExecutionEngine};
use crate::providers;
use crate::providers::ColumnMapMetric;
use crate::sql::SqlExpr;
use crate::{Batch, MetricResult, ValidationError};
use datafusion::logical_expr::Expr;
use expectations_core::{
    DataRow, DataValue, Kwargs, MetricConfiguration, PartialUnexpectedCount, UnexpectedIndexEntry,
    UnexpectedIndexQuery,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A row-level predicate selecting the *unexpected* rows of a domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// One flag per row (in-process)
    Mask(Arc<Vec<bool>>),
    /// DataFusion filter expression (distributed)
    DataFrame(Expr),
    /// SQL filter expression (relational)
    Sql(SqlExpr),
}

/// The condition of a column map metric, bound to its domain.
#[derive(Debug, Clone, PartialEq)]
pub struct UnexpectedCondition {
    pub condition: Condition,
    /// Domain column
    pub column: String,
    /// Compute kwargs of the domain
    pub compute_kwargs: Kwargs,
}

/// Value of a resolved metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(DataValue),
    ColumnTypes(Vec<ColumnMetadata>),
    ColumnNames(Vec<String>),
    Condition(Arc<UnexpectedCondition>),
    Values(Vec<DataValue>),
    ValueCounts(Vec<PartialUnexpectedCount>),
    IndexList(Vec<UnexpectedIndexEntry>),
    IndexQuery(UnexpectedIndexQuery),
    Rows(Vec<DataRow>),
}

impl MetricValue {
    fn kind(&self) -> &'static str {
        match self {
            MetricValue::Scalar(_) => "scalar",
            MetricValue::ColumnTypes(_) => "column types",
            MetricValue::ColumnNames(_) => "column names",
            MetricValue::Condition(_) => "condition",
            MetricValue::Values(_) => "values",
            MetricValue::ValueCounts(_) => "value counts",
            MetricValue::IndexList(_) => "index list",
            MetricValue::IndexQuery(_) => "index query",
            MetricValue::Rows(_) => "rows",
        }
    }

    /// Scalar value.
    pub fn as_scalar(&self) -> Option<&DataValue> {
        match self {
            MetricValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Scalar read as a count. SQL `SUM` over zero rows yields NULL, which counts
    /// as zero.
    pub fn as_count(&self) -> Option<usize> {
        match self {
            MetricValue::Scalar(DataValue::Null) => Some(0),
            MetricValue::Scalar(value) => value.as_int().and_then(|v| usize::try_from(v).ok()),
            _ => None,
        }
    }

    /// Column names.
    pub fn as_column_names(&self) -> Option<&[String]> {
        match self {
            MetricValue::ColumnNames(names) => Some(names),
            _ => None,
        }
    }

    /// Column metadata.
    pub fn as_column_types(&self) -> Option<&[ColumnMetadata]> {
        match self {
            MetricValue::ColumnTypes(columns) => Some(columns),
            _ => None,
        }
    }

    /// Bound condition.
    pub fn as_condition(&self) -> Option<&UnexpectedCondition> {
        match self {
            MetricValue::Condition(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn as_values(&self) -> Option<&[DataValue]> {
        match self {
            MetricValue::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_value_counts(&self) -> Option<&[PartialUnexpectedCount]> {
        match self {
            MetricValue::ValueCounts(counts) => Some(counts),
            _ => None,
        }
    }

    pub fn as_index_list(&self) -> Option<&[UnexpectedIndexEntry]> {
        match self {
            MetricValue::IndexList(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_index_query(&self) -> Option<&UnexpectedIndexQuery> {
        match self {
            MetricValue::IndexQuery(query) => Some(query),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[DataRow]> {
        match self {
            MetricValue::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// Upstream configurations of a metric, keyed by a label the provider picks.
pub type MetricDependencies = BTreeMap<String, MetricConfiguration>;

/// Everything a provider sees while computing one metric.
pub struct MetricContext<'a> {
    pub engine: &'a ExecutionEngine,
    pub batch: &'a Batch,
    pub metric: &'a MetricConfiguration,
    dependencies: &'a MetricDependencies,
    values: &'a HashMap<MetricConfiguration, MetricValue>,
}

impl<'a> MetricContext<'a> {
    pub(crate) fn new(
        engine: &'a ExecutionEngine,
        batch: &'a Batch,
        metric: &'a MetricConfiguration,
        dependencies: &'a MetricDependencies,
        values: &'a HashMap<MetricConfiguration, MetricValue>,
    ) -> Self {
        Self {
            engine,
            batch,
            metric,
            dependencies,
            values,
        }
    }

    /// Resolved value of the dependency declared under `label`.
    pub fn dep(&self, label: &str) -> MetricResult<&'a MetricValue> {
        let configuration = self.dependencies.get(label).ok_or_else(|| {
            ValidationError::metric(
                self.metric.metric_name(),
                format!("no dependency declared under '{label}'"),
            )
        })?;
        self.values.get(configuration).ok_or_else(|| {
            ValidationError::upstream(self.metric.metric_name(), configuration.metric_name())
        })
    }

    fn wrong_kind(&self, label: &str, expected: &str, found: &MetricValue) -> ValidationError {
        ValidationError::metric(
            self.metric.metric_name(),
            format!("dependency '{label}' is {} but {expected} was expected", found.kind()),
        )
    }

    pub fn dep_count(&self, label: &str) -> MetricResult<usize> {
        let value = self.dep(label)?;
        value
            .as_count()
            .ok_or_else(|| self.wrong_kind(label, "a count", value))
    }

    pub fn dep_column_names(&self, label: &str) -> MetricResult<&'a [String]> {
        let value = self.dep(label)?;
        value
            .as_column_names()
            .ok_or_else(|| self.wrong_kind(label, "column names", value))
    }

    pub fn dep_column_types(&self, label: &str) -> MetricResult<&'a [ColumnMetadata]> {
        let value = self.dep(label)?;
        value
            .as_column_types()
            .ok_or_else(|| self.wrong_kind(label, "column types", value))
    }

    pub fn dep_condition(&self, label: &str) -> MetricResult<&'a UnexpectedCondition> {
        let value = self.dep(label)?;
        value
            .as_condition()
            .ok_or_else(|| self.wrong_kind(label, "a condition", value))
    }
}

pub type DependencyFn =
    Arc<dyn Fn(&MetricConfiguration) -> MetricResult<MetricDependencies> + Send + Sync>;
pub type ValueFn = Arc<dyn Fn(&MetricContext<'_>) -> MetricResult<MetricValue> + Send + Sync>;
pub type PartialFn = Arc<dyn Fn(&MetricContext<'_>) -> MetricResult<AggregateRequest> + Send + Sync>;

/// How a provider produces its value.
#[derive(Clone)]
pub enum MetricImplementation {
    /// Computed directly
    Value(ValueFn),
    /// Aggregate partial evaluated by the backend in a fused pass
    AggregatePartial(PartialFn),
}

/// Implementation of one metric on one backend.
#[derive(Clone)]
pub struct MetricProvider {
    metric_name: String,
    backend: BackendKind,
    dependencies: Option<DependencyFn>,
    implementation: MetricImplementation,
}

impl fmt::Debug for MetricProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.implementation {
            MetricImplementation::Value(_) => "value",
            MetricImplementation::AggregatePartial(_) => "aggregate_partial",
        };
        f.debug_struct("MetricProvider")
            .field("metric_name", &self.metric_name)
            .field("backend", &self.backend)
            .field("implementation", &kind)
            .finish()
    }
}

impl MetricProvider {
    /// Provider computing its value directly.
    pub fn value<F>(metric_name: impl Into<String>, backend: BackendKind, compute: F) -> Self
    where
        F: Fn(&MetricContext<'_>) -> MetricResult<MetricValue> + Send + Sync + 'static,
    {
        Self {
            metric_name: metric_name.into(),
            backend,
            dependencies: None,
            implementation: MetricImplementation::Value(Arc::new(compute)),
        }
    }

    /// Provider contributing an aggregate partial to a fused pass.
    pub fn aggregate_partial<F>(
        metric_name: impl Into<String>,
        backend: BackendKind,
        partial: F,
    ) -> Self
    where
        F: Fn(&MetricContext<'_>) -> MetricResult<AggregateRequest> + Send + Sync + 'static,
    {
        Self {
            metric_name: metric_name.into(),
            backend,
            dependencies: None,
            implementation: MetricImplementation::AggregatePartial(Arc::new(partial)),
        }
    }

    /// Declares upstream dependencies.
    pub fn with_dependencies<F>(mut self, dependencies: F) -> Self
    where
        F: Fn(&MetricConfiguration) -> MetricResult<MetricDependencies> + Send + Sync + 'static,
    {
        self.dependencies = Some(Arc::new(dependencies));
        self
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn implementation(&self) -> &MetricImplementation {
        &self.implementation
    }

    /// Upstream configurations of `metric`.
    pub fn dependencies(&self, metric: &MetricConfiguration) -> MetricResult<MetricDependencies> {
        match &self.dependencies {
            Some(dependencies) => dependencies(metric),
            None => Ok(MetricDependencies::new()),
        }
    }
}

/// Static capability table `(metric name, backend) -> provider`.
///
/// # Example
///
/// ```rust
/// use expectations_validator::{BackendKind, MetricRegistry};
///
/// let registry = MetricRegistry::with_defaults();
/// assert!(registry.get("table.row_count", BackendKind::Relational).is_ok());
/// assert!(registry.get("table.median", BackendKind::Relational).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    providers: HashMap<(String, BackendKind), MetricProvider>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        providers::register_defaults(&mut registry);
        registry
    }

    /// Process-wide registry of built-in providers, populated once.
    pub fn global() -> &'static MetricRegistry {
        static GLOBAL: OnceLock<MetricRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::with_defaults)
    }

    /// Adds or replaces a provider.
    pub fn register(&mut self, provider: MetricProvider) {
        self.providers.insert(
            (provider.metric_name.clone(), provider.backend),
            provider,
        );
    }

    /// Registers every derived metric of a column map metric on every backend.
    pub fn register_column_map_metric(&mut self, metric: ColumnMapMetric) {
        providers::map::register(self, Arc::new(metric));
    }

    /// Looks up the provider for `metric_name` on `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ProviderNotFound`] naming both.
    pub fn get(&self, metric_name: &str, backend: BackendKind) -> MetricResult<&MetricProvider> {
        self.providers
            .get(&(metric_name.to_string(), backend))
            .ok_or_else(|| ValidationError::provider_not_found(metric_name, backend.as_str()))
    }

    pub fn contains(&self, metric_name: &str, backend: BackendKind) -> bool {
        self.providers.contains_key(&(metric_name.to_string(), backend))
    }

    /// Sorted metric names available on `backend`.
    pub fn metric_names(&self, backend: BackendKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .providers
            .keys()
            .filter(|(_, kind)| *kind == backend)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
