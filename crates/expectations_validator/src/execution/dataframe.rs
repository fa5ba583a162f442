//! Distributed dataframe engine backed by DataFusion.
//!
//! Conditions are DataFusion [`Expr`](datafusion::logical_expr::Expr)s applied lazily
//! to the batch's [`DataFrame`]. Aggregate partials over one compute domain are
//! evaluated together in a single `aggregate` pass.
//!
//! Frames are re-planned under the engine's own single-partition session, whichever
//! session built them, and results are gathered partition by partition, so listed
//! rows come back in their natural order.

use super::{
    AggregateFn, AggregateRequest, BackendKind, ColumnMetadata, ComputeDomain, ExecutionBackend,
    build_runtime, group_by_domain, split_domain_kwargs,
};
use crate::convert::single_row_values;
use crate::{Batch, BatchData, MetricResult, ValidationError};
use arrow_array::RecordBatch;
use datafusion::dataframe::DataFrame;
use datafusion::prelude::{SessionConfig, SessionContext};
use expectations_core::{DataValue, Kwargs};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

/// Engine for batches held as DataFusion dataframes.
#[derive(Clone)]
pub struct DataFrameEngine {
    ctx: SessionContext,
    runtime: Arc<Runtime>,
}

impl fmt::Debug for DataFrameEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrameEngine")
            .field("session_id", &self.ctx.session_id())
            .finish()
    }
}

impl DataFrameEngine {
    /// Creates an engine with its own session and runtime.
    pub fn new() -> MetricResult<Self> {
        let config = SessionConfig::new().with_target_partitions(1);
        Ok(Self {
            ctx: SessionContext::new_with_config(config),
            runtime: build_runtime()?,
        })
    }

    /// The DataFusion session.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Wraps a record batch as a dataframe of this session.
    pub fn read_batch(&self, batch: RecordBatch) -> MetricResult<DataFrame> {
        Ok(self.ctx.read_batch(batch)?)
    }

    /// The dataframe behind `batch`, planned under this engine's session.
    pub fn dataframe(&self, batch: &Batch) -> MetricResult<DataFrame> {
        match batch.data() {
            BatchData::DataFrame(df) => Ok(DataFrame::new(
                self.ctx.state(),
                df.logical_plan().clone(),
            )),
            _ => Err(ValidationError::backend(format!(
                "batch '{}' is not a dataframe",
                batch.id()
            ))),
        }
    }

    /// Executes `df` and collects its record batches in partition order.
    pub fn collect(&self, df: DataFrame) -> MetricResult<Vec<RecordBatch>> {
        let partitions = self.runtime.block_on(df.collect_partitioned())?;
        Ok(partitions.into_iter().flatten().collect())
    }

    /// Executes `df` and keeps its first `limit` rows in natural order.
    ///
    /// The limit is applied after collection: a plan-level limit over several
    /// partitions merges them in completion order.
    pub fn collect_rows(&self, df: DataFrame, limit: Option<usize>) -> MetricResult<Vec<RecordBatch>> {
        let batches = self.collect(df)?;
        let Some(limit) = limit else {
            return Ok(batches);
        };
        let mut remaining = limit;
        let mut kept = Vec::new();
        for batch in batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            kept.push(batch.slice(0, take));
            remaining -= take;
        }
        Ok(kept)
    }

    fn evaluate_group(
        &self,
        df: &DataFrame,
        bundle: &[AggregateRequest],
        positions: &[usize],
    ) -> MetricResult<Vec<DataValue>> {
        let mut aggregates = Vec::with_capacity(positions.len());
        for (slot, &position) in positions.iter().enumerate() {
            match &bundle[position].function {
                AggregateFn::DataFrame(expr) => {
                    aggregates.push(expr.clone().alias(format!("__agg_{slot}")))
                }
                AggregateFn::Sql(_) => {
                    return Err(ValidationError::metric(
                        bundle[position].metric.metric_name(),
                        "SQL aggregate handed to the dataframe engine",
                    ));
                }
            }
        }

        debug!("Evaluating {} fused aggregates in one pass", aggregates.len());
        let batches = self.collect(df.clone().aggregate(vec![], aggregates)?)?;
        single_row_values(&batches)
    }
}

impl ExecutionBackend for DataFrameEngine {
    type Selectable = DataFrame;

    fn kind(&self) -> BackendKind {
        BackendKind::DistributedTable
    }

    fn get_compute_domain(
        &self,
        batch: &Batch,
        domain_kwargs: &Kwargs,
    ) -> MetricResult<ComputeDomain<DataFrame>> {
        let (compute_kwargs, accessor_kwargs) = split_domain_kwargs(batch, domain_kwargs)?;
        Ok(ComputeDomain {
            selectable: self.dataframe(batch)?,
            compute_kwargs,
            accessor_kwargs,
        })
    }

    fn column_metadata(&self, batch: &Batch) -> MetricResult<Vec<ColumnMetadata>> {
        let df = self.dataframe(batch)?;
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
                Ok(values) => {
                    let err = ValidationError::backend(format!(
                        "aggregate pass returned {} values for {} requests",
                        values.len(),
                        positions.len()
                    ));
                    for position in positions {
                        results[position] = Err(err.clone());
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
    use datafusion::functions_aggregate::expr_fn::count;
    use datafusion::logical_expr::{col, lit};
    use expectations_core::MetricConfiguration;
    use pretty_assertions::assert_eq;

    fn batch(engine: &DataFrameEngine) -> Batch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let record_batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])),
            ],
        )
        .unwrap();
        Batch::dataframe("b1", engine.read_batch(record_batch).unwrap())
    }

    #[test]
    fn test_column_metadata_from_schema() {
        let engine = DataFrameEngine::new().unwrap();
        let columns = engine.column_metadata(&batch(&engine)).unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(columns[1].nullable, Some(true));
    }

    #[test]
    fn test_bundle_evaluated_per_domain() {
        let engine = DataFrameEngine::new().unwrap();
        let batch = batch(&engine);
        let domain = Kwargs::new().with("batch_id", "b1");
        let request = |name: &str, expr| AggregateRequest {
            metric: MetricConfiguration::new(name, domain.clone(), Kwargs::new()),
            function: AggregateFn::DataFrame(expr),
            compute_kwargs: domain.clone(),
        };
        let bundle = vec![
            request("rows", count(lit(1i64))),
            request("names", count(col("name"))),
        ];

        let results = engine.resolve_metric_bundle(&batch, &bundle);
        let values: Vec<DataValue> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![DataValue::Int(3), DataValue::Int(2)]);
    }
}
