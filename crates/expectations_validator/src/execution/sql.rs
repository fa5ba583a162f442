//! Relational engine.
//!
//! Queries are compiled from [`SelectStatement`]s with every value inlined and run
//! through scoped connections drawn from a [`ConnectionPool`]. The shipped connection
//! talks to a DataFusion [`SessionContext`] acting as the database, with
//! `information_schema` enabled for column reflection.

use super::{
    AggregateFn, AggregateRequest, BackendKind, ColumnMetadata, ComputeDomain, ExecutionBackend,
    build_runtime, group_by_domain, split_domain_kwargs,
};
use crate::convert::{record_batches_to_rows, single_row_values};
use crate::sql::{CompareOp, DialectRegistry, SelectItem, SelectStatement, SqlDialect, SqlExpr, SqlFrom};
use crate::{Batch, BatchData, MetricResult, ValidationError};
use arrow_array::RecordBatch;
use datafusion::prelude::{SessionConfig, SessionContext};
use expectations_core::{DataValue, Kwargs};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;

/// Keeps scans unrepartitioned so rows come back in table order.
const SINGLE_PARTITION: &str = "SET datafusion.execution.target_partitions = 1";

/// A bounded pool of connections to one database.
#[derive(Clone)]
pub struct ConnectionPool {
    ctx: SessionContext,
    max_connections: usize,
    active: Arc<AtomicUsize>,
}

impl ConnectionPool {
    /// Creates a pool over `ctx`.
    pub fn new(ctx: SessionContext, max_connections: usize) -> Self {
        Self {
            ctx,
            max_connections: max_connections.max(1),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Checks out a connection. It is returned when the guard is dropped.
    ///
    /// # Errors
    ///
    /// Fails if every connection is in use.
    pub fn acquire(&self) -> MetricResult<PooledConnection<'_>> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < self.max_connections).then_some(active + 1)
            })
            .map_err(|active| {
                ValidationError::backend(format!(
                    "connection pool exhausted ({active} of {} in use)",
                    self.max_connections
                ))
            })?;
        Ok(PooledConnection { pool: self })
    }

    /// Connections currently checked out.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Maximum number of simultaneous connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A checked-out connection; released on drop, on every exit path.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
}

impl PooledConnection<'_> {
    /// Runs `sql` and collects the result, partition by partition.
    pub fn query(&self, runtime: &Runtime, sql: &str) -> MetricResult<Vec<RecordBatch>> {
        let ctx = &self.pool.ctx;
        let result: datafusion::error::Result<Vec<Vec<RecordBatch>>> = runtime.block_on(async {
            let df = ctx.sql(sql).await?;
            df.collect_partitioned().await
        });
        Ok(result?.into_iter().flatten().collect())
    }

    /// Plans `sql` without reading rows and returns the result's column metadata.
    pub fn describe(&self, runtime: &Runtime, sql: &str) -> MetricResult<Vec<ColumnMetadata>> {
        let df = runtime.block_on(self.pool.ctx.sql(sql))?;
        Ok(df
            .schema()
            .fields()
            .iter()
            .map(|field| ColumnMetadata {
                name: field.name().clone(),
                data_type: Some(field.data_type().to_string()),
                nullable: Some(field.is_nullable()),
            })
            .collect())
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine for batches that live in a relational database.
#[derive(Clone)]
pub struct SqlEngine {
    pool: ConnectionPool,
    dialect: SqlDialect,
    runtime: Arc<Runtime>,
}

impl fmt::Debug for SqlEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlEngine")
            .field("dialect", &self.dialect)
            .field("max_connections", &self.pool.max_connections)
            .finish()
    }
}

impl SqlEngine {
    /// Creates an engine over `ctx`, compiling for `dialect`.
    ///
    /// The session is switched to a single target partition.
    ///
    /// # Errors
    ///
    /// Fails if `dialect` is not in the process-wide [`DialectRegistry`].
    pub fn new(ctx: SessionContext, dialect: SqlDialect) -> MetricResult<Self> {
        Self::with_registry(ctx, dialect, DialectRegistry::global())
    }

    /// Creates an engine checking `dialect` against a specific registry.
    pub fn with_registry(
        ctx: SessionContext,
        dialect: SqlDialect,
        registry: &DialectRegistry,
    ) -> MetricResult<Self> {
        let dialect = registry.require(dialect)?;
        let runtime = build_runtime()?;
        runtime.block_on(ctx.sql(SINGLE_PARTITION))?;
        debug!("Relational session {} pinned to one target partition", ctx.session_id());
        Ok(Self {
            pool: ConnectionPool::new(ctx, DEFAULT_MAX_CONNECTIONS),
            dialect,
            runtime,
        })
    }

    /// Creates an engine over a fresh in-memory database.
    pub fn in_memory(dialect: SqlDialect) -> MetricResult<Self> {
        let config = SessionConfig::new().with_information_schema(true);
        Self::new(SessionContext::new_with_config(config), dialect)
    }

    /// Sets the pool size.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.pool = ConnectionPool::new(self.pool.ctx.clone(), max_connections);
        self
    }

    /// Dialect queries are compiled for.
    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// The connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Registers a record batch as a table.
    pub fn register_batch(&self, name: &str, batch: RecordBatch) -> MetricResult<()> {
        self.pool.ctx.register_batch(name, batch)?;
        Ok(())
    }

    /// Runs a statement for its side effects (e.g. `CREATE VIEW`).
    pub fn execute(&self, sql: &str) -> MetricResult<()> {
        let conn = self.pool.acquire()?;
        conn.query(&self.runtime, sql)?;
        Ok(())
    }

    /// The relation behind `batch`.
    pub fn source<'a>(&self, batch: &'a Batch) -> MetricResult<&'a SqlFrom> {
        match batch.data() {
            BatchData::Relational(from) => Ok(from),
            _ => Err(ValidationError::backend(format!(
                "batch '{}' is not a relational source",
                batch.id()
            ))),
        }
    }

    /// Compiles and runs `statement`.
    pub fn query(&self, statement: &SelectStatement) -> MetricResult<Vec<RecordBatch>> {
        let sql = statement.render(self.dialect)?;
        debug!("Executing SQL: {}", sql);
        let conn = self.pool.acquire()?;
        conn.query(&self.runtime, &sql)
    }

    fn reflect_columns(
        &self,
        schema: Option<&str>,
        name: &str,
    ) -> MetricResult<Vec<ColumnMetadata>> {
        let mut filter = SqlExpr::column("table_name").compare(CompareOp::Eq, DataValue::from(name));
        if let Some(schema) = schema {
            filter = filter.and(
                SqlExpr::column("table_schema").compare(CompareOp::Eq, DataValue::from(schema)),
            );
        }
        let statement = SelectStatement::columns(
            ["column_name", "data_type", "is_nullable", "ordinal_position"],
            SqlFrom::Table {
                schema: Some("information_schema".to_string()),
                name: "columns".to_string(),
            },
        )
        .filter(filter);

        let mut rows = record_batches_to_rows(&self.query(&statement)?)?;
        rows.sort_by_key(|row| row.get("ordinal_position").and_then(DataValue::as_int));

        rows.into_iter()
            .map(|row| {
                let name = row
                    .get("column_name")
                    .and_then(DataValue::as_str)
                    .ok_or_else(|| ValidationError::backend("reflection row without column_name"))?
                    .to_string();
                Ok(ColumnMetadata {
                    name,
                    data_type: row.get("data_type").and_then(DataValue::as_str).map(str::to_string),
                    nullable: row
                        .get("is_nullable")
                        .and_then(DataValue::as_str)
                        .map(|v| v.eq_ignore_ascii_case("YES")),
                })
            })
            .collect()
    }

    /// Runs a one-row sample query and reads the column names from the result metadata.
    fn describe_columns(&self, from: &SqlFrom) -> MetricResult<Vec<ColumnMetadata>> {
        let sample = SelectStatement::all(from.clone())
            .limit(Some(1))
            .render(self.dialect)?;
        debug!("Describing columns with: {}", sample);
        let conn = self.pool.acquire()?;
        conn.describe(&self.runtime, &sample)
    }

    fn evaluate_group(
        &self,
        from: &SqlFrom,
        bundle: &[AggregateRequest],
        positions: &[usize],
    ) -> MetricResult<Vec<DataValue>> {
        let mut items = Vec::with_capacity(positions.len());
        for (slot, &position) in positions.iter().enumerate() {
            match &bundle[position].function {
                AggregateFn::Sql(expr) => items.push(SelectItem::Aliased {
                    expr: expr.clone(),
                    alias: format!("agg_{slot}"),
                }),
                AggregateFn::DataFrame(_) => {
                    return Err(ValidationError::metric(
                        bundle[position].metric.metric_name(),
                        "dataframe aggregate handed to the SQL engine",
                    ));
                }
            }
        }
        let statement = SelectStatement {
            items,
            from: from.clone(),
            filter: None,
            limit: None,
        };
        single_row_values(&self.query(&statement)?)
    }
}

impl ExecutionBackend for SqlEngine {
    type Selectable = SqlFrom;

    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn get_compute_domain(
        &self,
        batch: &Batch,
        domain_kwargs: &Kwargs,
    ) -> MetricResult<ComputeDomain<SqlFrom>> {
        let (compute_kwargs, accessor_kwargs) = split_domain_kwargs(batch, domain_kwargs)?;
        Ok(ComputeDomain {
            selectable: self.source(batch)?.clone(),
            compute_kwargs,
            accessor_kwargs,
        })
    }

    fn column_metadata(&self, batch: &Batch) -> MetricResult<Vec<ColumnMetadata>> {
        let from = self.source(batch)?;
        let reflected = match from {
            SqlFrom::Table { schema, name } => self.reflect_columns(schema.as_deref(), name),
            SqlFrom::Query(_) => Ok(Vec::new()),
        };

        match reflected {
            Ok(columns) if !columns.is_empty() => return Ok(columns),
            Ok(_) => debug!(
                "Reflection found no columns for '{}', falling back to a sample query",
                from.display_name()
            ),
            Err(err) => warn!(
                "Reflection failed for '{}' ({}), falling back to a sample query",
                from.display_name(),
                err
            ),
        }

        match self.describe_columns(from) {
            Ok(columns) if !columns.is_empty() => Ok(columns),
            Ok(_) => Err(ValidationError::introspection(
                from.display_name(),
                "sample query returned no columns",
            )),
            Err(err) => Err(ValidationError::introspection(from.display_name(), err.to_string())),
        }
    }

    fn resolve_metric_bundle(
        &self,
        batch: &Batch,
        bundle: &[AggregateRequest],
    ) -> Vec<MetricResult<DataValue>> {
        let mut results: Vec<MetricResult<DataValue>> =
            (0..bundle.len()).map(|_| Ok(DataValue::Null)).collect();

        for (compute_kwargs, positions) in group_by_domain(bundle) {
            let outcome = self
                .get_compute_domain(batch, &compute_kwargs)
                .and_then(|domain| self.evaluate_group(&domain.selectable, bundle, &positions));
            match outcome {
                Ok(values) if values.len() == positions.len() => {
                    for (position, value) in positions.iter().zip(values) {
                        results[*position] = Ok(value);
                    }
                }
                Ok(_) => {
                    for position in positions {
                        results[position] =
                            Err(ValidationError::backend("aggregate query returned the wrong arity"));
                    }
                }
                Err(err) => {
                    for position in positions {
                        results[position] = Err(err.clone());
                    }
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use pretty_assertions::assert_eq;

    fn engine() -> SqlEngine {
        let engine = SqlEngine::in_memory(SqlDialect::Postgresql).unwrap();
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
            ],
        )
        .unwrap();
        engine.register_batch("people", batch).unwrap();
        engine
    }

    fn names(columns: &[ColumnMetadata]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_reflection_lists_columns_in_order() {
        let engine = engine();
        let batch = Batch::relational_table("b1", None, "people");
        let columns = engine.column_metadata(&batch).unwrap();
        assert_eq!(names(&columns), vec!["id", "name"]);
        assert_eq!(engine.pool().active_connections(), 0);
    }

    #[test]
    fn test_custom_query_uses_sample_query() {
        let engine = engine();
        let batch = Batch::relational_query("b1", "SELECT name, id * 2 AS doubled FROM people");
        let columns = engine.column_metadata(&batch).unwrap();
        assert_eq!(names(&columns), vec!["name", "doubled"]);
    }

    #[test]
    fn test_sample_query_used_when_reflection_unavailable() {
        let ctx = SessionContext::new();
        let engine = SqlEngine::new(ctx, SqlDialect::Postgresql).unwrap();
        engine.execute("CREATE TABLE scratch AS VALUES (1, 'x')").unwrap();

        let batch = Batch::relational_table("b1", None, "scratch");
        let columns = engine.column_metadata(&batch).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(engine.pool().active_connections(), 0);
    }

    #[test]
    fn test_unknown_relation_is_introspection_failure() {
        let engine = engine();
        let batch = Batch::relational_table("b1", None, "missing_table");
        let err = engine.column_metadata(&batch).unwrap_err();
        assert!(matches!(err, ValidationError::BackendIntrospection { .. }));
        assert_eq!(engine.pool().active_connections(), 0);
    }

    #[test]
    fn test_supplied_session_runs_on_one_partition() {
        let ctx = SessionContext::new_with_config(SessionConfig::new().with_target_partitions(8));
        let engine = SqlEngine::new(ctx, SqlDialect::Postgresql).unwrap();
        assert_eq!(engine.pool.ctx.copied_config().target_partitions(), 1);
    }

    #[test]
    fn test_pool_limit() {
        let engine = engine().with_max_connections(1);
        let held = engine.pool().acquire().unwrap();
        assert!(engine.pool().acquire().is_err());
        drop(held);
        assert!(engine.pool().acquire().is_ok());
    }

    #[test]
    fn test_unregistered_dialect_rejected() {
        let err = SqlEngine::with_registry(
            SessionContext::new(),
            SqlDialect::Trino,
            &DialectRegistry::empty(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bundle_counts() {
        let engine = engine();
        let batch = Batch::relational_table("b1", None, "people");
        let domain = Kwargs::new().with("batch_id", "b1");
        let request = |name: &str, expr| AggregateRequest {
            metric: expectations_core::MetricConfiguration::new(name, domain.clone(), Kwargs::new()),
            function: AggregateFn::Sql(expr),
            compute_kwargs: domain.clone(),
        };
        let bundle = vec![
            request("rows", SqlExpr::CountAll),
            request("nulls", SqlExpr::CountIf(Box::new(SqlExpr::column("name").is_null()))),
        ];
        let values: Vec<DataValue> = engine
            .resolve_metric_bundle(&batch, &bundle)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(values, vec![DataValue::Int(2), DataValue::Int(1)]);
    }
}
