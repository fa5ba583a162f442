//! Column map metrics.
//!
//! A [`ColumnMapMetric`] describes one row-level test ("value is in the set",
//! "value matches the regex") once per backend. Registering it derives the whole
//! metric family from that test:
//!
//! | suffix | value |
//! |---|---|
//! | `condition` | predicate selecting the unexpected rows |
//! | `unexpected_count` | number of unexpected rows (`.aggregate_fn` partial on fused backends) |
//! | `unexpected_values` | domain values of unexpected rows, natural order |
//! | `unexpected_value_counts` | per-value counts, descending, ties in first-seen order |
//! | `unexpected_index_list` | identifying fields (or positions) of unexpected rows |
//! | `unexpected_index_query` | audit query reproducing the unexpected rows |
//! | `unexpected_rows` | full unexpected rows |
//!
//! `limit` caps the list-valued metrics; `unexpected_index_column_names` names the
//! identifier columns. Neither is part of the condition's identity.

use super::AGGREGATE_FN_SUFFIX;
use super::table::{TABLE_COLUMN_TYPES, TABLE_COLUMNS};
use crate::convert::{first_column_values, record_batches_to_rows};
use crate::execution::{AggregateFn, AggregateRequest, BackendKind, ExecutionBackend};
use crate::registry::{
    Condition, MetricContext, MetricDependencies, MetricProvider, MetricValue,
    UnexpectedCondition,
};
use crate::sql::{SelectStatement, SqlExpr};
use crate::{MetricRegistry, MetricResult, Table, ValidationError};
use datafusion::dataframe::DataFrame;
use datafusion::functions_aggregate::expr_fn::sum;
use datafusion::logical_expr::expr::InList;
use datafusion::logical_expr::{BinaryExpr, Expr, Operator, ident, lit, when};
use expectations_core::{
    COLUMN_KWARG, ConfigurationError, DataRow, DataValue, Kwargs, MetricConfiguration,
    PartialUnexpectedCount, UnexpectedIndexEntry, UnexpectedIndexQuery,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Caps list-valued metrics.
pub const LIMIT_KWARG: &str = "limit";

/// Identifier columns of `unexpected_index_list` / `unexpected_index_query`.
pub const INDEX_COLUMNS_KWARG: &str = "unexpected_index_column_names";

pub const CONDITION: &str = "condition";
pub const UNEXPECTED_COUNT: &str = "unexpected_count";
pub const UNEXPECTED_VALUES: &str = "unexpected_values";
pub const UNEXPECTED_VALUE_COUNTS: &str = "unexpected_value_counts";
pub const UNEXPECTED_INDEX_LIST: &str = "unexpected_index_list";
pub const UNEXPECTED_INDEX_QUERY: &str = "unexpected_index_query";
pub const UNEXPECTED_ROWS: &str = "unexpected_rows";

/// Full name of a derived metric, e.g. `column_values.in_set.unexpected_count`.
pub fn map_metric_name(base: &str, suffix: &str) -> String {
    format!("{base}.{suffix}")
}

/// Test applied to each value; true means the value is expected.
pub type RowTest = Box<dyn Fn(&DataValue) -> bool + Send + Sync>;
/// Builds a [`RowTest`] from the metric's value kwargs.
pub type RowTestFn = Arc<dyn Fn(&Kwargs) -> MetricResult<RowTest> + Send + Sync>;
/// Builds the *expected* predicate over a column expression.
pub type DataFrameConditionFn = Arc<dyn Fn(Expr, &Kwargs) -> MetricResult<Expr> + Send + Sync>;
/// Builds the *expected* predicate over a SQL column.
pub type SqlConditionFn = Arc<dyn Fn(SqlExpr, &Kwargs) -> MetricResult<SqlExpr> + Send + Sync>;

/// A row-level test expressed once per backend.
#[derive(Clone)]
pub struct ColumnMapMetric {
    name: String,
    filter_column_isnull: bool,
    requires_text: bool,
    row_test: RowTestFn,
    dataframe: DataFrameConditionFn,
    sql: SqlConditionFn,
}

impl fmt::Debug for ColumnMapMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMapMetric")
            .field("name", &self.name)
            .field("filter_column_isnull", &self.filter_column_isnull)
            .field("requires_text", &self.requires_text)
            .finish()
    }
}

impl ColumnMapMetric {
    /// Creates a map metric. Null values are excluded from the test unless
    /// [`with_filter_column_isnull(false)`](Self::with_filter_column_isnull) is set.
    pub fn new<R, D, S>(name: impl Into<String>, row_test: R, dataframe: D, sql: S) -> Self
    where
        R: Fn(&Kwargs) -> MetricResult<RowTest> + Send + Sync + 'static,
        D: Fn(Expr, &Kwargs) -> MetricResult<Expr> + Send + Sync + 'static,
        S: Fn(SqlExpr, &Kwargs) -> MetricResult<SqlExpr> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            filter_column_isnull: true,
            requires_text: false,
            row_test: Arc::new(row_test),
            dataframe: Arc::new(dataframe),
            sql: Arc::new(sql),
        }
    }

    pub fn with_filter_column_isnull(mut self, filter_column_isnull: bool) -> Self {
        self.filter_column_isnull = filter_column_isnull;
        self
    }

    /// Restricts the metric to text columns; other column types fail the condition
    /// on every backend.
    pub fn with_requires_text(mut self, requires_text: bool) -> Self {
        self.requires_text = requires_text;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requires_text(&self) -> bool {
        self.requires_text
    }

    /// Whether null values are excluded before testing.
    pub fn filter_column_isnull(&self) -> bool {
        self.filter_column_isnull
    }

    /// Full name of the derived metric `suffix`.
    pub fn metric_name(&self, suffix: &str) -> String {
        map_metric_name(&self.name, suffix)
    }
}

/// Value kwargs identifying the condition: everything but the list options.
pub fn condition_value_kwargs(value_kwargs: &Kwargs) -> Kwargs {
    value_kwargs.without(LIMIT_KWARG).without(INDEX_COLUMNS_KWARG)
}

type DependencyBuilder =
    Box<dyn Fn(&MetricConfiguration) -> MetricResult<MetricDependencies> + Send + Sync>;

fn depends_on(metric: &ColumnMapMetric, suffixes: &[&str], with_columns: bool) -> DependencyBuilder {
    let names: Vec<(String, String)> = suffixes
        .iter()
        .map(|suffix| (suffix.to_string(), metric.metric_name(suffix)))
        .collect();
    Box::new(move |configuration| {
        let mut dependencies = MetricDependencies::new();
        for (label, name) in &names {
            let value_kwargs = if label == CONDITION {
                condition_value_kwargs(configuration.value_kwargs())
            } else {
                configuration.value_kwargs().clone()
            };
            dependencies.insert(label.clone(), configuration.sibling(name.as_str(), value_kwargs));
        }
        if with_columns {
            dependencies.insert(
                TABLE_COLUMNS.to_string(),
                configuration.table_metric(TABLE_COLUMNS),
            );
        }
        Ok(dependencies)
    })
}

pub(crate) fn register(registry: &mut MetricRegistry, metric: Arc<ColumnMapMetric>) {
    let aggregate_name = format!("{}{AGGREGATE_FN_SUFFIX}", metric.metric_name(UNEXPECTED_COUNT));
    let aggregate_label = format!("{UNEXPECTED_COUNT}{AGGREGATE_FN_SUFFIX}");

    for backend in BackendKind::ALL {
        let m = Arc::clone(&metric);
        let columns = depends_on(&metric, &[], true);
        let requires_text = metric.requires_text;
        registry.register(
            MetricProvider::value(metric.metric_name(CONDITION), backend, move |ctx| {
                compute_condition(&m, ctx)
            })
            .with_dependencies(move |configuration: &MetricConfiguration| {
                let mut dependencies = columns(configuration)?;
                if requires_text {
                    dependencies.insert(
                        TABLE_COLUMN_TYPES.to_string(),
                        configuration.table_metric(TABLE_COLUMN_TYPES),
                    );
                }
                Ok(dependencies)
            }),
        );

        let condition_only = || depends_on(&metric, &[CONDITION], false);

        match backend {
            BackendKind::InProcessTable => {
                registry.register(
                    MetricProvider::value(metric.metric_name(UNEXPECTED_COUNT), backend, |ctx| {
                        let (_, mask) = mask(ctx)?;
                        Ok(MetricValue::Scalar(mask.iter().filter(|f| **f).count().into()))
                    })
                    .with_dependencies(condition_only()),
                );
                register_lists(
                    registry,
                    &metric,
                    backend,
                    in_process::values,
                    in_process::rows,
                    in_process::index_list,
                    in_process::index_query,
                );
            }
            BackendKind::DistributedTable | BackendKind::Relational => {
                registry.register(
                    MetricProvider::aggregate_partial(aggregate_name.as_str(), backend, |ctx| {
                        let condition = ctx.dep_condition(CONDITION)?;
                        let function = match &condition.condition {
                            Condition::DataFrame(expr) => AggregateFn::DataFrame(sum(
                                when(expr.clone(), lit(1i64)).otherwise(lit(0i64))?,
                            )),
                            Condition::Sql(expr) => {
                                AggregateFn::Sql(SqlExpr::CountIf(Box::new(expr.clone())))
                            }
                            Condition::Mask(_) => return Err(wrong_condition(ctx)),
                        };
                        Ok(AggregateRequest {
                            metric: ctx.metric.clone(),
                            function,
                            compute_kwargs: condition.compute_kwargs.clone(),
                        })
                    })
                    .with_dependencies(condition_only()),
                );

                let label = aggregate_label.clone();
                let partial = aggregate_name.clone();
                registry.register(
                    MetricProvider::value(metric.metric_name(UNEXPECTED_COUNT), backend, move |ctx| {
                        Ok(MetricValue::Scalar(ctx.dep_count(&label)?.into()))
                    })
                    .with_dependencies({
                        let label = aggregate_label.clone();
                        move |configuration| {
                            Ok(MetricDependencies::from([(
                                label.clone(),
                                configuration.sibling(
                                    partial.as_str(),
                                    condition_value_kwargs(configuration.value_kwargs()),
                                ),
                            )]))
                        }
                    }),
                );

                if backend == BackendKind::DistributedTable {
                    register_lists(
                        registry,
                        &metric,
                        backend,
                        dataframe::values,
                        dataframe::rows,
                        dataframe::index_list,
                        dataframe::index_query,
                    );
                } else {
                    register_lists(
                        registry,
                        &metric,
                        backend,
                        relational::values,
                        relational::rows,
                        relational::index_list,
                        relational::index_query,
                    );
                }
            }
        }

        registry.register(
            MetricProvider::value(metric.metric_name(UNEXPECTED_VALUE_COUNTS), backend, |ctx| {
                let values = match ctx.engine {
                    crate::ExecutionEngine::InProcess(_) => in_process::all_values(ctx)?,
                    crate::ExecutionEngine::DataFrame(_) => dataframe::all_values(ctx)?,
                    crate::ExecutionEngine::Sql(_) => relational::all_values(ctx)?,
                };
                Ok(MetricValue::ValueCounts(value_counts(values, limit(ctx))))
            })
            .with_dependencies(condition_only()),
        );
    }
}

type ListFn = fn(&MetricContext<'_>) -> MetricResult<MetricValue>;

fn register_lists(
    registry: &mut MetricRegistry,
    metric: &ColumnMapMetric,
    backend: BackendKind,
    values: ListFn,
    rows: ListFn,
    index_list: ListFn,
    index_query: ListFn,
) {
    registry.register(
        MetricProvider::value(metric.metric_name(UNEXPECTED_VALUES), backend, values)
            .with_dependencies(depends_on(metric, &[CONDITION], false)),
    );
    registry.register(
        MetricProvider::value(metric.metric_name(UNEXPECTED_ROWS), backend, rows)
            .with_dependencies(depends_on(metric, &[CONDITION], false)),
    );
    registry.register(
        MetricProvider::value(metric.metric_name(UNEXPECTED_INDEX_LIST), backend, index_list)
            .with_dependencies(depends_on(metric, &[CONDITION], true)),
    );
    registry.register(
        MetricProvider::value(metric.metric_name(UNEXPECTED_INDEX_QUERY), backend, index_query)
            .with_dependencies(depends_on(metric, &[CONDITION], true)),
    );
}

fn compute_condition(metric: &ColumnMapMetric, ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
    let column = ctx
        .metric
        .column()
        .ok_or_else(|| ConfigurationError::missing_kwarg(COLUMN_KWARG))?;
    let columns = ctx.dep_column_names(TABLE_COLUMNS)?;
    if !columns.iter().any(|c| c == column) {
        return Err(ValidationError::metric(
            ctx.metric.metric_name(),
            format!("column '{column}' does not exist in batch '{}'", ctx.batch.id()),
        ));
    }
    if metric.requires_text {
        require_text_column(ctx, column)?;
    }

    let compute_kwargs = ctx
        .engine
        .compute_kwargs(ctx.batch, ctx.metric.domain_kwargs())?;
    let value_kwargs = ctx.metric.value_kwargs();

    let condition = match ctx.engine {
        crate::ExecutionEngine::InProcess(engine) => {
            let table = engine.table(ctx.batch)?;
            let values = table.column(column).ok_or_else(|| {
                ValidationError::metric(ctx.metric.metric_name(), format!("missing column '{column}'"))
            })?;
            let test = (metric.row_test)(value_kwargs)?;
            let mask = values
                .iter()
                .map(|value| !(metric.filter_column_isnull && value.is_null()) && !test(value))
                .collect();
            Condition::Mask(Arc::new(mask))
        }
        crate::ExecutionEngine::DataFrame(_) => {
            let unexpected = negate_expr((metric.dataframe)(ident(column), value_kwargs)?);
            Condition::DataFrame(if metric.filter_column_isnull {
                ident(column).is_not_null().and(unexpected)
            } else {
                unexpected
            })
        }
        crate::ExecutionEngine::Sql(_) => {
            let unexpected = (metric.sql)(SqlExpr::column(column), value_kwargs)?.negate();
            Condition::Sql(if metric.filter_column_isnull {
                SqlExpr::column(column).is_not_null().and(unexpected)
            } else {
                unexpected
            })
        }
    };

    debug!("Built condition for {}", ctx.metric);
    Ok(MetricValue::Condition(Arc::new(UnexpectedCondition {
        condition,
        column: column.to_string(),
        compute_kwargs,
    })))
}

fn require_text_column(ctx: &MetricContext<'_>, column: &str) -> MetricResult<()> {
    let data_type = ctx
        .dep_column_types(TABLE_COLUMN_TYPES)?
        .iter()
        .find(|c| c.name == column)
        .and_then(|c| c.data_type.as_deref());
    match data_type {
        Some(data_type) if !is_text_type(data_type) => Err(ValidationError::metric(
            ctx.metric.metric_name(),
            format!("column '{column}' has type {data_type}; only text columns are supported"),
        )),
        // All-null in-process columns have no inferred type.
        _ => Ok(()),
    }
}

/// Text types as reported by Arrow schemas, `information_schema` and the in-process
/// table.
pub(crate) fn is_text_type(data_type: &str) -> bool {
    let data_type = data_type.to_ascii_lowercase();
    data_type.contains("utf8")
        || data_type.contains("char")
        || data_type == "text"
        || data_type == "string"
}

/// Negates a DataFusion predicate, pushing the negation into the operator where
/// one exists so the rendered filter stays readable.
pub(crate) fn negate_expr(expr: Expr) -> Expr {
    match expr {
        Expr::InList(InList {
            expr,
            list,
            negated,
        }) => Expr::InList(InList::new(expr, list, !negated)),
        Expr::IsNull(inner) => Expr::IsNotNull(inner),
        Expr::IsNotNull(inner) => Expr::IsNull(inner),
        Expr::BinaryExpr(BinaryExpr {
            left,
            op: Operator::RegexMatch,
            right,
        }) => Expr::BinaryExpr(BinaryExpr::new(left, Operator::RegexNotMatch, right)),
        Expr::Not(inner) => *inner,
        other => Expr::Not(Box::new(other)),
    }
}

fn wrong_condition(ctx: &MetricContext<'_>) -> ValidationError {
    ValidationError::metric(
        ctx.metric.metric_name(),
        format!("condition was built for another backend than '{}'", ctx.engine.kind()),
    )
}

fn limit(ctx: &MetricContext<'_>) -> Option<usize> {
    ctx.metric.value_kwargs().get_usize(LIMIT_KWARG)
}

fn mask<'a>(ctx: &MetricContext<'a>) -> MetricResult<(&'a UnexpectedCondition, &'a [bool])> {
    let condition = ctx.dep_condition(CONDITION)?;
    match &condition.condition {
        Condition::Mask(mask) => Ok((condition, mask.as_slice())),
        _ => Err(wrong_condition(ctx)),
    }
}

/// Counts distinct values, most frequent first; ties keep first-seen order.
pub(crate) fn value_counts(values: Vec<DataValue>, limit: Option<usize>) -> Vec<PartialUnexpectedCount> {
    let mut counts: Vec<PartialUnexpectedCount> = Vec::new();
    let mut seen: HashMap<DataValue, usize> = HashMap::new();
    for value in values {
        match seen.get(&value) {
            Some(&slot) => counts[slot].count += 1,
            None => {
                seen.insert(value.clone(), counts.len());
                counts.push(PartialUnexpectedCount { value, count: 1 });
            }
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    if let Some(limit) = limit {
        counts.truncate(limit);
    }
    counts
}

/// Configured identifier columns, checked against the batch.
///
/// # Errors
///
/// A name that is neither a column nor a named row index is a configuration error.
fn configured_identifiers(ctx: &MetricContext<'_>) -> MetricResult<Option<Vec<String>>> {
    let Some(names) = ctx.metric.value_kwargs().get_str_list(INDEX_COLUMNS_KWARG) else {
        return Ok(None);
    };
    let columns = ctx.dep_column_names(TABLE_COLUMNS)?;
    check_identifiers(&names, columns, &ctx.batch.named_indices())?;
    Ok(Some(names))
}

/// Fails on the first name that is neither a column nor a named row index.
pub(crate) fn check_identifiers(
    names: &[String],
    columns: &[String],
    named_indices: &[String],
) -> MetricResult<()> {
    match names
        .iter()
        .find(|name| !columns.contains(name) && !named_indices.contains(name))
    {
        Some(name) => Err(ConfigurationError::unknown_identifier_column(name.as_str()).into()),
        None => Ok(()),
    }
}

/// Domain column followed by the identifier columns, without repeats.
fn projection(column: &str, identifiers: &[String]) -> Vec<String> {
    let mut columns = vec![column.to_string()];
    for name in identifiers {
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    columns
}

mod in_process {
    use super::*;

    fn table<'a>(ctx: &MetricContext<'a>) -> MetricResult<&'a Arc<Table>> {
        ctx.engine.as_in_process(ctx.metric)?.table(ctx.batch)
    }

    fn positions(mask: &[bool]) -> impl Iterator<Item = usize> + '_ {
        mask.iter()
            .enumerate()
            .filter_map(|(row, unexpected)| unexpected.then_some(row))
    }

    fn column<'a>(
        ctx: &MetricContext<'_>,
        table: &'a Table,
        name: &str,
    ) -> MetricResult<&'a [DataValue]> {
        table.column(name).ok_or_else(|| {
            ValidationError::metric(ctx.metric.metric_name(), format!("missing column '{name}'"))
        })
    }

    pub(super) fn all_values(ctx: &MetricContext<'_>) -> MetricResult<Vec<DataValue>> {
        let (condition, mask) = mask(ctx)?;
        let table = table(ctx)?;
        let values = column(ctx, table, &condition.column)?;
        Ok(positions(mask).map(|row| values[row].clone()).collect())
    }

    pub(super) fn values(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let (condition, mask) = mask(ctx)?;
        let table = table(ctx)?;
        let values = column(ctx, table, &condition.column)?;
        Ok(MetricValue::Values(
            positions(mask)
                .take(limit(ctx).unwrap_or(usize::MAX))
                .map(|row| values[row].clone())
                .collect(),
        ))
    }

    pub(super) fn rows(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let (_, mask) = mask(ctx)?;
        let table = table(ctx)?;
        Ok(MetricValue::Rows(
            positions(mask)
                .take(limit(ctx).unwrap_or(usize::MAX))
                .map(|row| table.row(row))
                .collect(),
        ))
    }

    /// Configured identifiers, else the named row indices, else none (positions).
    fn identifiers(ctx: &MetricContext<'_>, table: &Table) -> MetricResult<Option<Vec<String>>> {
        if let Some(names) = configured_identifiers(ctx)? {
            return Ok(Some(names));
        }
        if table.has_named_index() {
            return Ok(Some(
                table.index_names().into_iter().map(str::to_string).collect(),
            ));
        }
        Ok(None)
    }

    pub(super) fn index_list(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let (condition, mask) = mask(ctx)?;
        let table = table(ctx)?;
        let rows = positions(mask).take(limit(ctx).unwrap_or(usize::MAX));

        let entries = match identifiers(ctx, table)? {
            Some(identifiers) => {
                let fields = projection(&condition.column, &identifiers);
                let columns = fields
                    .iter()
                    .map(|name| {
                        table.lookup(name).map(|values| (name, values)).ok_or_else(|| {
                            ValidationError::from(ConfigurationError::unknown_identifier_column(
                                name.as_str(),
                            ))
                        })
                    })
                    .collect::<MetricResult<Vec<_>>>()?;
                rows.map(|row| {
                    let record: DataRow = columns
                        .iter()
                        .map(|(name, values)| ((*name).clone(), values[row].clone()))
                        .collect();
                    UnexpectedIndexEntry::Record(record)
                })
                .collect()
            }
            None => rows.map(UnexpectedIndexEntry::Position).collect(),
        };
        Ok(MetricValue::IndexList(entries))
    }

    pub(super) fn index_query(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let (_, mask) = mask(ctx)?;
        let table = table(ctx)?;
        configured_identifiers(ctx)?;
        Ok(MetricValue::IndexQuery(UnexpectedIndexQuery::Indices(
            positions(mask).map(|row| table.row_label(row)).collect(),
        )))
    }
}

mod dataframe {
    use super::*;

    fn unexpected_rows<'a>(
        ctx: &MetricContext<'a>,
    ) -> MetricResult<(&'a crate::DataFrameEngine, DataFrame, String)> {
        let condition = ctx.dep_condition(CONDITION)?;
        let Condition::DataFrame(expr) = &condition.condition else {
            return Err(wrong_condition(ctx));
        };
        let engine = ctx.engine.as_dataframe(ctx.metric)?;
        let domain = engine.get_compute_domain(ctx.batch, ctx.metric.domain_kwargs())?;
        Ok((engine, domain.selectable.filter(expr.clone())?, condition.column.clone()))
    }

    fn column_values(ctx: &MetricContext<'_>, limit: Option<usize>) -> MetricResult<Vec<DataValue>> {
        let (engine, df, column) = unexpected_rows(ctx)?;
        let df = df.select(vec![ident(column)])?;
        first_column_values(&engine.collect_rows(df, limit)?)
    }

    pub(super) fn all_values(ctx: &MetricContext<'_>) -> MetricResult<Vec<DataValue>> {
        column_values(ctx, None)
    }

    pub(super) fn values(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        Ok(MetricValue::Values(column_values(ctx, limit(ctx))?))
    }

    pub(super) fn rows(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let (engine, df, _) = unexpected_rows(ctx)?;
        let batches = engine.collect_rows(df, limit(ctx))?;
        Ok(MetricValue::Rows(record_batches_to_rows(&batches)?))
    }

    pub(super) fn index_list(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let identifiers = configured_identifiers(ctx)?.ok_or_else(|| {
            ValidationError::metric(
                ctx.metric.metric_name(),
                "dataframes have no positional row identity; configure unexpected_index_column_names",
            )
        })?;
        let (engine, df, column) = unexpected_rows(ctx)?;
        let fields = projection(&column, &identifiers);
        let df = df.select(fields.iter().map(|name| ident(name.as_str())).collect::<Vec<_>>())?;
        let rows = record_batches_to_rows(&engine.collect_rows(df, limit(ctx))?)?;
        Ok(MetricValue::IndexList(
            rows.into_iter().map(UnexpectedIndexEntry::Record).collect(),
        ))
    }

    pub(super) fn index_query(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        configured_identifiers(ctx)?;
        let condition = ctx.dep_condition(CONDITION)?;
        let Condition::DataFrame(expr) = &condition.condition else {
            return Err(wrong_condition(ctx));
        };
        Ok(MetricValue::IndexQuery(UnexpectedIndexQuery::Text(format!(
            "df.filter({expr})"
        ))))
    }
}

mod relational {
    use super::*;

    fn statement<'a>(
        ctx: &MetricContext<'a>,
        columns: Option<Vec<String>>,
        limit: Option<usize>,
    ) -> MetricResult<(&'a crate::SqlEngine, SelectStatement, String)> {
        let condition = ctx.dep_condition(CONDITION)?;
        let Condition::Sql(expr) = &condition.condition else {
            return Err(wrong_condition(ctx));
        };
        let engine = ctx.engine.as_sql(ctx.metric)?;
        let from = engine
            .get_compute_domain(ctx.batch, ctx.metric.domain_kwargs())?
            .selectable;
        let statement = match columns {
            Some(columns) => SelectStatement::columns(columns, from),
            None => SelectStatement::all(from),
        }
        .filter(expr.clone())
        .limit(limit);
        Ok((engine, statement, condition.column.clone()))
    }

    fn column_values(ctx: &MetricContext<'_>, limit: Option<usize>) -> MetricResult<Vec<DataValue>> {
        let column = ctx.dep_condition(CONDITION)?.column.clone();
        let (engine, statement, _) = statement(ctx, Some(vec![column]), limit)?;
        first_column_values(&engine.query(&statement)?)
    }

    pub(super) fn all_values(ctx: &MetricContext<'_>) -> MetricResult<Vec<DataValue>> {
        column_values(ctx, None)
    }

    pub(super) fn values(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        Ok(MetricValue::Values(column_values(ctx, limit(ctx))?))
    }

    pub(super) fn rows(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let (engine, statement, _) = statement(ctx, None, limit(ctx))?;
        Ok(MetricValue::Rows(record_batches_to_rows(&engine.query(&statement)?)?))
    }

    pub(super) fn index_list(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let identifiers = configured_identifiers(ctx)?.ok_or_else(|| {
            ValidationError::metric(
                ctx.metric.metric_name(),
                "relations have no positional row identity; configure unexpected_index_column_names",
            )
        })?;
        let column = ctx.dep_condition(CONDITION)?.column.clone();
        let (engine, statement, _) =
            statement(ctx, Some(projection(&column, &identifiers)), limit(ctx))?;
        let rows = record_batches_to_rows(&engine.query(&statement)?)?;
        Ok(MetricValue::IndexList(
            rows.into_iter().map(UnexpectedIndexEntry::Record).collect(),
        ))
    }

    pub(super) fn index_query(ctx: &MetricContext<'_>) -> MetricResult<MetricValue> {
        let identifiers = configured_identifiers(ctx)?.unwrap_or_default();
        let column = ctx.dep_condition(CONDITION)?.column.clone();
        let (engine, statement, _) = statement(ctx, Some(projection(&column, &identifiers)), None)?;
        Ok(MetricValue::IndexQuery(UnexpectedIndexQuery::Text(
            statement.render_audit_query(engine.dialect())?,
        )))
    }
}
