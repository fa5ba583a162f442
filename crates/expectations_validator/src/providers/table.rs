//! Table-domain metrics: column metadata, column names, identifier columns and row
//! count.

use super::AGGREGATE_FN_SUFFIX;
use super::map::{INDEX_COLUMNS_KWARG, check_identifiers};
use crate::execution::{AggregateFn, AggregateRequest, BackendKind};
use crate::registry::{MetricDependencies, MetricProvider, MetricValue};
use crate::sql::SqlExpr;
use crate::{MetricRegistry, MetricResult, ValidationError};
use datafusion::functions_aggregate::expr_fn::count;
use datafusion::logical_expr::lit;
use expectations_core::MetricConfiguration;

pub const TABLE_COLUMN_TYPES: &str = "table.column_types";
pub const TABLE_COLUMNS: &str = "table.columns";
/// Configured identifier columns, checked against the batch at every result level.
pub const TABLE_IDENTIFIER_COLUMNS: &str = "table.identifier_columns";
pub const TABLE_ROW_COUNT: &str = "table.row_count";

fn column_types_dependency(metric: &MetricConfiguration) -> MetricResult<MetricDependencies> {
    Ok(MetricDependencies::from([(
        TABLE_COLUMN_TYPES.to_string(),
        metric.table_metric(TABLE_COLUMN_TYPES),
    )]))
}

fn columns_dependency(metric: &MetricConfiguration) -> MetricResult<MetricDependencies> {
    Ok(MetricDependencies::from([(
        TABLE_COLUMNS.to_string(),
        metric.table_metric(TABLE_COLUMNS),
    )]))
}

fn row_count_partial(metric: &MetricConfiguration) -> MetricResult<MetricDependencies> {
    let partial = format!("{TABLE_ROW_COUNT}{AGGREGATE_FN_SUFFIX}");
    Ok(MetricDependencies::from([(
        partial.clone(),
        metric.table_metric(partial),
    )]))
}

pub(super) fn register(registry: &mut MetricRegistry) {
    for backend in BackendKind::ALL {
        registry.register(MetricProvider::value(TABLE_COLUMN_TYPES, backend, |ctx| {
            Ok(MetricValue::ColumnTypes(
                ctx.engine
                    .column_metadata(ctx.batch)
                    .map_err(|e| e.for_metric(ctx.metric.metric_name()))?,
            ))
        }));

        registry.register(
            MetricProvider::value(TABLE_COLUMNS, backend, |ctx| {
                let columns = ctx.dep(TABLE_COLUMN_TYPES)?.as_column_types().ok_or_else(|| {
                    ValidationError::metric(TABLE_COLUMNS, "column types dependency has the wrong kind")
                })?;
                Ok(MetricValue::ColumnNames(
                    columns.iter().map(|c| c.name.clone()).collect(),
                ))
            })
            .with_dependencies(column_types_dependency),
        );

        registry.register(
            MetricProvider::value(TABLE_IDENTIFIER_COLUMNS, backend, |ctx| {
                let names = ctx
                    .metric
                    .value_kwargs()
                    .get_str_list(INDEX_COLUMNS_KWARG)
                    .unwrap_or_default();
                let columns = ctx.dep_column_names(TABLE_COLUMNS)?;
                check_identifiers(&names, columns, &ctx.batch.named_indices())?;
                Ok(MetricValue::ColumnNames(names))
            })
            .with_dependencies(columns_dependency),
        );
    }

    registry.register(MetricProvider::value(
        TABLE_ROW_COUNT,
        BackendKind::InProcessTable,
        |ctx| {
            let table = ctx.engine.as_in_process(ctx.metric)?.table(ctx.batch)?;
            Ok(MetricValue::Scalar(table.len().into()))
        },
    ));

    let partial_name = format!("{TABLE_ROW_COUNT}{AGGREGATE_FN_SUFFIX}");
    for backend in [BackendKind::DistributedTable, BackendKind::Relational] {
        registry.register(MetricProvider::aggregate_partial(
            partial_name.as_str(),
            backend,
            move |ctx| {
                let function = match backend {
                    BackendKind::Relational => AggregateFn::Sql(SqlExpr::CountAll),
                    _ => AggregateFn::DataFrame(count(lit(1i64))),
                };
                let compute_kwargs = ctx
                    .engine
                    .compute_kwargs(ctx.batch, ctx.metric.domain_kwargs())?;
                Ok(AggregateRequest {
                    metric: ctx.metric.clone(),
                    function,
                    compute_kwargs,
                })
            },
        ));

        let dependency = partial_name.clone();
        registry.register(
            MetricProvider::value(TABLE_ROW_COUNT, backend, move |ctx| {
                Ok(MetricValue::Scalar(ctx.dep_count(&dependency)?.into()))
            })
            .with_dependencies(row_count_partial),
        );
    }
}
