//! Execution backends.
//!
//! Every backend answers the same questions about a batch: what the compute domain of
//! a set of domain kwargs is, which columns exist, and (for engines that can fuse
//! work) what the values of a bundle of aggregate partials are. Metric providers are
//! registered per [`BackendKind`] and reach their concrete engine through
//! [`ExecutionEngine`].

mod dataframe;
mod in_process;
mod sql;

pub use dataframe::DataFrameEngine;
pub use in_process::InProcessEngine;
pub use sql::{ConnectionPool, PooledConnection, SqlEngine};

use crate::sql::SqlExpr;
use crate::{Batch, MetricResult, ValidationError};
use datafusion::logical_expr::Expr;
use expectations_core::{
    BATCH_ID_KWARG, COLUMN_KWARG, ConfigurationError, DataValue, Kwargs, MetricConfiguration,
};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// The three kinds of backend a batch can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// In-process table engine
    InProcessTable,
    /// Distributed dataframe engine
    DistributedTable,
    /// Relational engine
    Relational,
}

impl BackendKind {
    /// Every backend kind.
    pub const ALL: [BackendKind; 3] = [
        BackendKind::InProcessTable,
        BackendKind::DistributedTable,
        BackendKind::Relational,
    ];

    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InProcessTable => "in_process_table",
            BackendKind::DistributedTable => "distributed_table",
            BackendKind::Relational => "relational",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,
    /// Backend type name, if known
    pub data_type: Option<String>,
    /// Nullability, if known
    pub nullable: Option<bool>,
}

/// A compute domain: what to read, plus the kwargs split into those that shaped the
/// selectable (`compute_kwargs`) and those the metric still has to apply
/// (`accessor_kwargs`, e.g. the column).
#[derive(Debug, Clone)]
pub struct ComputeDomain<S> {
    pub selectable: S,
    pub compute_kwargs: Kwargs,
    pub accessor_kwargs: Kwargs,
}

impl<S> ComputeDomain<S> {
    /// Column of a column domain.
    pub fn column(&self) -> Option<&str> {
        self.accessor_kwargs.get_str(COLUMN_KWARG)
    }
}

/// A backend-specific aggregate expression awaiting evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateFn {
    /// DataFusion aggregate expression
    DataFrame(Expr),
    /// SQL aggregate expression
    Sql(SqlExpr),
}

/// One aggregate partial of a fused bundle.
#[derive(Debug, Clone)]
pub struct AggregateRequest {
    /// Metric the value belongs to
    pub metric: MetricConfiguration,
    /// Expression to evaluate
    pub function: AggregateFn,
    /// Compute kwargs of the domain; requests sharing them share one pass
    pub compute_kwargs: Kwargs,
}

/// Operations every backend supports.
pub trait ExecutionBackend {
    /// What a compute domain reads from.
    type Selectable;

    /// Backend kind.
    fn kind(&self) -> BackendKind;

    /// Narrows `batch` to the domain described by `domain_kwargs`.
    fn get_compute_domain(
        &self,
        batch: &Batch,
        domain_kwargs: &Kwargs,
    ) -> MetricResult<ComputeDomain<Self::Selectable>>;

    /// Ordered column metadata of the batch.
    fn column_metadata(&self, batch: &Batch) -> MetricResult<Vec<ColumnMetadata>>;

    /// Evaluates a bundle of aggregate partials, one physical pass per compute domain.
    ///
    /// Returns one result per request, in request order. Backends that compute
    /// aggregates directly keep the default, which rejects every request.
    fn resolve_metric_bundle(
        &self,
        _batch: &Batch,
        bundle: &[AggregateRequest],
    ) -> Vec<MetricResult<DataValue>> {
        bundle
            .iter()
            .map(|request| {
                Err(ValidationError::metric(
                    request.metric.metric_name(),
                    format!("backend '{}' does not evaluate aggregate partials", self.kind()),
                ))
            })
            .collect()
    }
}

/// Splits domain kwargs and checks they refer to `batch`.
pub(crate) fn split_domain_kwargs(
    batch: &Batch,
    domain_kwargs: &Kwargs,
) -> MetricResult<(Kwargs, Kwargs)> {
    if let Some(requested) = domain_kwargs.get_str(BATCH_ID_KWARG) {
        if requested != batch.id() {
            return Err(ConfigurationError::BatchMismatch {
                requested: requested.to_string(),
                active: batch.id().to_string(),
            }
            .into());
        }
    }
    let compute_kwargs = domain_kwargs.without(COLUMN_KWARG);
    let mut accessor_kwargs = Kwargs::new();
    if let Some(column) = domain_kwargs.get(COLUMN_KWARG) {
        accessor_kwargs.insert(COLUMN_KWARG, column.clone());
    }
    Ok((compute_kwargs, accessor_kwargs))
}

/// Groups bundle positions by compute domain, keeping first-seen order.
pub(crate) fn group_by_domain(bundle: &[AggregateRequest]) -> Vec<(Kwargs, Vec<usize>)> {
    let mut groups: Vec<(Kwargs, Vec<usize>)> = Vec::new();
    for (position, request) in bundle.iter().enumerate() {
        match groups.iter_mut().find(|(kwargs, _)| *kwargs == request.compute_kwargs) {
            Some((_, positions)) => positions.push(position),
            None => groups.push((request.compute_kwargs.clone(), vec![position])),
        }
    }
    groups
}

/// Builds the runtime the DataFusion-backed engines block on.
pub(crate) fn build_runtime() -> MetricResult<Arc<Runtime>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(|e| ValidationError::backend(format!("failed to start runtime: {e}")))
}

/// The engine owning the active batch.
#[derive(Debug, Clone)]
pub enum ExecutionEngine {
    InProcess(InProcessEngine),
    DataFrame(DataFrameEngine),
    Sql(SqlEngine),
}

impl ExecutionEngine {
    /// Backend kind.
    pub fn kind(&self) -> BackendKind {
        match self {
            ExecutionEngine::InProcess(engine) => engine.kind(),
            ExecutionEngine::DataFrame(engine) => engine.kind(),
            ExecutionEngine::Sql(engine) => engine.kind(),
        }
    }

    /// Ordered column metadata of `batch`.
    pub fn column_metadata(&self, batch: &Batch) -> MetricResult<Vec<ColumnMetadata>> {
        self.check_batch(batch)?;
        match self {
            ExecutionEngine::InProcess(engine) => engine.column_metadata(batch),
            ExecutionEngine::DataFrame(engine) => engine.column_metadata(batch),
            ExecutionEngine::Sql(engine) => engine.column_metadata(batch),
        }
    }

    /// Compute kwargs of a domain over `batch`: the domain kwargs without the column.
    pub fn compute_kwargs(&self, batch: &Batch, domain_kwargs: &Kwargs) -> MetricResult<Kwargs> {
        self.check_batch(batch)?;
        Ok(split_domain_kwargs(batch, domain_kwargs)?.0)
    }

    /// Evaluates a bundle of aggregate partials.
    pub fn resolve_metric_bundle(
        &self,
        batch: &Batch,
        bundle: &[AggregateRequest],
    ) -> Vec<MetricResult<DataValue>> {
        if let Err(err) = self.check_batch(batch) {
            return bundle.iter().map(|_| Err(err.clone())).collect();
        }
        match self {
            ExecutionEngine::InProcess(engine) => engine.resolve_metric_bundle(batch, bundle),
            ExecutionEngine::DataFrame(engine) => engine.resolve_metric_bundle(batch, bundle),
            ExecutionEngine::Sql(engine) => engine.resolve_metric_bundle(batch, bundle),
        }
    }

    /// The in-process engine, or an error naming the metric.
    pub fn as_in_process(&self, metric: &MetricConfiguration) -> MetricResult<&InProcessEngine> {
        match self {
            ExecutionEngine::InProcess(engine) => Ok(engine),
            _ => Err(self.mismatch(metric)),
        }
    }

    /// The dataframe engine, or an error naming the metric.
    pub fn as_dataframe(&self, metric: &MetricConfiguration) -> MetricResult<&DataFrameEngine> {
        match self {
            ExecutionEngine::DataFrame(engine) => Ok(engine),
            _ => Err(self.mismatch(metric)),
        }
    }

    /// The SQL engine, or an error naming the metric.
    pub fn as_sql(&self, metric: &MetricConfiguration) -> MetricResult<&SqlEngine> {
        match self {
            ExecutionEngine::Sql(engine) => Ok(engine),
            _ => Err(self.mismatch(metric)),
        }
    }

    fn mismatch(&self, metric: &MetricConfiguration) -> ValidationError {
        ValidationError::metric(
            metric.metric_name(),
            format!("provider invoked on the wrong engine '{}'", self.kind()),
        )
    }

    /// Checks that `batch` is readable by this engine.
    pub fn check_batch(&self, batch: &Batch) -> MetricResult<()> {
        if batch.kind() == self.kind() {
            Ok(())
        } else {
            Err(ValidationError::backend(format!(
                "batch '{}' lives in a {} backend but the engine is {}",
                batch.id(),
                batch.kind(),
                self.kind()
            )))
        }
    }
}

impl From<InProcessEngine> for ExecutionEngine {
    fn from(engine: InProcessEngine) -> Self {
        ExecutionEngine::InProcess(engine)
    }
}

impl From<DataFrameEngine> for ExecutionEngine {
    fn from(engine: DataFrameEngine) -> Self {
        ExecutionEngine::DataFrame(engine)
    }
}

impl From<SqlEngine> for ExecutionEngine {
    fn from(engine: SqlEngine) -> Self {
        ExecutionEngine::Sql(engine)
    }
}
