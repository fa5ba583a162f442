//! Result format policy engine.
//!
//! Given the normalised [`ResultFormat`] of a column map expectation,
//! [`MapMetricPlan::new`] decides which derived metrics have to be resolved, and
//! [`MapMetricPlan::evaluate`] shapes the resolved values into the result payload.
//!
//! | level | adds |
//! |---|---|
//! | `BOOLEAN_ONLY` | nothing |
//! | `BASIC` | counts, percentages, `partial_unexpected_list` |
//! | `SUMMARY` | `partial_unexpected_counts`, `partial_unexpected_index_list` |
//! | `COMPLETE` | full lists, `unexpected_index_query`, `unexpected_rows` (opt-in) |

use crate::execution::BackendKind;
use crate::providers::{
    INDEX_COLUMNS_KWARG, LIMIT_KWARG, NONNULL, TABLE_IDENTIFIER_COLUMNS, TABLE_ROW_COUNT,
    UNEXPECTED_COUNT,
    UNEXPECTED_INDEX_LIST, UNEXPECTED_INDEX_QUERY, UNEXPECTED_ROWS, UNEXPECTED_VALUE_COUNTS,
    UNEXPECTED_VALUES, condition_value_kwargs, map_metric_name,
};
use crate::registry::MetricValue;
use crate::resolver::ResolvedMetrics;
use crate::{MetricResult, ValidationError};
use expectations_core::{
    COLUMN_KWARG, DataValue, ExpectationResultPayload, Kwargs, MetricConfiguration, ResultFormat,
    ResultFormatLevel,
};

/// Metrics a column map expectation needs at its result format.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMetricPlan {
    pub format: ResultFormat,
    pub row_count: MetricConfiguration,
    /// Configured identifier columns, checked at every level
    pub identifier_columns: Option<MetricConfiguration>,
    /// `column_values.nonnull.unexpected_count`, i.e. the missing count; absent when
    /// nulls take part in the condition
    pub missing_count: Option<MetricConfiguration>,
    pub unexpected_count: MetricConfiguration,
    pub unexpected_values: Option<MetricConfiguration>,
    pub unexpected_value_counts: Option<MetricConfiguration>,
    pub unexpected_index_list: Option<MetricConfiguration>,
    pub unexpected_index_query: Option<MetricConfiguration>,
    pub unexpected_rows: Option<MetricConfiguration>,
}

/// Outcome of a column map expectation.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMetricOutcome {
    pub success: bool,
    pub payload: ExpectationResultPayload,
}

impl MapMetricPlan {
    /// Plans the metrics of a column map expectation.
    ///
    /// `domain` is the column domain (batch id and column) and `value_kwargs` the
    /// condition parameters. Index lists are planned when identifier columns are
    /// configured, or on the in-process backend where positions and named row
    /// indices identify rows.
    pub fn new(
        map_metric: &str,
        filter_column_isnull: bool,
        domain: &Kwargs,
        value_kwargs: &Kwargs,
        format: &ResultFormat,
        backend: BackendKind,
    ) -> Self {
        let condition_kwargs = condition_value_kwargs(value_kwargs);
        let derived = |suffix: &str, kwargs: Kwargs| {
            MetricConfiguration::new(map_metric_name(map_metric, suffix), domain.clone(), kwargs)
        };
        let with_limit = |limit: Option<usize>| match limit {
            Some(limit) => condition_kwargs.clone().with(LIMIT_KWARG, limit),
            None => condition_kwargs.clone(),
        };
        let with_identifiers = |kwargs: Kwargs| match &format.unexpected_index_column_names {
            Some(names) => kwargs.with(INDEX_COLUMNS_KWARG, names.clone()),
            None => kwargs,
        };

        let table_domain = domain.without(COLUMN_KWARG);
        let partial = Some(format.partial_unexpected_count);
        let complete = format.at_least(ResultFormatLevel::Complete);
        let partial_or_full = if complete { None } else { partial };
        let index_available =
            format.unexpected_index_column_names.is_some() || backend == BackendKind::InProcessTable;

        Self {
            format: format.clone(),
            identifier_columns: format.unexpected_index_column_names.as_ref().map(|names| {
                MetricConfiguration::new(
                    TABLE_IDENTIFIER_COLUMNS,
                    table_domain.clone(),
                    Kwargs::new().with(INDEX_COLUMNS_KWARG, names.clone()),
                )
            }),
            row_count: MetricConfiguration::new(TABLE_ROW_COUNT, table_domain, Kwargs::new()),
            missing_count: filter_column_isnull.then(|| derived_nonnull(domain)),
            unexpected_count: derived(UNEXPECTED_COUNT, condition_kwargs.clone()),
            unexpected_values: format
                .at_least(ResultFormatLevel::Basic)
                .then(|| derived(UNEXPECTED_VALUES, with_limit(partial_or_full))),
            unexpected_value_counts: format
                .at_least(ResultFormatLevel::Summary)
                .then(|| derived(UNEXPECTED_VALUE_COUNTS, with_limit(partial))),
            unexpected_index_list: (format.at_least(ResultFormatLevel::Summary) && index_available)
                .then(|| derived(UNEXPECTED_INDEX_LIST, with_identifiers(with_limit(partial_or_full)))),
            unexpected_index_query: (complete && format.return_unexpected_index_query)
                .then(|| derived(UNEXPECTED_INDEX_QUERY, with_identifiers(condition_kwargs.clone()))),
            unexpected_rows: (complete && format.include_unexpected_rows)
                .then(|| derived(UNEXPECTED_ROWS, condition_kwargs.clone())),
        }
    }

    /// Every planned metric.
    pub fn metrics(&self) -> Vec<MetricConfiguration> {
        let mut metrics = vec![self.row_count.clone(), self.unexpected_count.clone()];
        metrics.extend(
            [
                &self.identifier_columns,
                &self.missing_count,
                &self.unexpected_values,
                &self.unexpected_value_counts,
                &self.unexpected_index_list,
                &self.unexpected_index_query,
                &self.unexpected_rows,
            ]
            .into_iter()
            .flatten()
            .cloned(),
        );
        metrics
    }

    /// Planned metrics that failed to resolve.
    pub fn failed_metrics(&self, resolved: &ResolvedMetrics) -> Vec<MetricConfiguration> {
        self.metrics()
            .into_iter()
            .filter(|m| !resolved.is_resolved(m))
            .collect()
    }

    /// Computes success against `mostly` and shapes the payload.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first planned metric that did not resolve.
    pub fn evaluate(&self, resolved: &ResolvedMetrics, mostly: f64) -> MetricResult<MapMetricOutcome> {
        let identifiers = match &self.identifier_columns {
            Some(metric) => Some(lookup(resolved, metric, MetricValue::as_column_names)?.to_vec()),
            None => None,
        };
        let element_count = count(resolved, &self.row_count)?;
        let missing_count = match &self.missing_count {
            Some(metric) => Some(count(resolved, metric)?),
            None => None,
        };
        let unexpected_count = count(resolved, &self.unexpected_count)?;
        let nonmissing_count = element_count.saturating_sub(missing_count.unwrap_or(0));

        let success = nonmissing_count == 0
            || (nonmissing_count.saturating_sub(unexpected_count)) as f64 / nonmissing_count as f64
                >= mostly;

        let mut payload = ExpectationResultPayload::default();
        let format = &self.format;
        if !format.at_least(ResultFormatLevel::Basic) {
            return Ok(MapMetricOutcome { success, payload });
        }

        let limit = format.partial_unexpected_count;
        payload.element_count = Some(element_count);
        if let Some(missing) = missing_count {
            payload.missing_count = Some(missing);
            payload.missing_percent = Some(percent(missing, element_count));
        }
        payload.unexpected_count = Some(unexpected_count);
        payload.unexpected_percent = Some(percent(unexpected_count, nonmissing_count));
        payload.unexpected_percent_total = Some(percent(unexpected_count, element_count));
        payload.unexpected_percent_nonmissing = Some(percent(unexpected_count, nonmissing_count));
        payload.unexpected_index_column_names = identifiers;

        if let Some(metric) = &self.unexpected_values {
            let values = lookup(resolved, metric, MetricValue::as_values)?;
            payload.partial_unexpected_list = Some(truncated(values, limit));
            if format.at_least(ResultFormatLevel::Complete) {
                payload.unexpected_list = Some(values.to_vec());
            }
        }

        if !format.at_least(ResultFormatLevel::Summary) {
            return Ok(MapMetricOutcome { success, payload });
        }

        if let Some(metric) = &self.unexpected_value_counts {
            let counts = lookup(resolved, metric, MetricValue::as_value_counts)?;
            payload.partial_unexpected_counts = Some(truncated(counts, limit));
        }
        if let Some(metric) = &self.unexpected_index_list {
            let entries = lookup(resolved, metric, MetricValue::as_index_list)?;
            payload.partial_unexpected_index_list = Some(truncated(entries, limit));
            if format.at_least(ResultFormatLevel::Complete) {
                payload.unexpected_index_list = Some(entries.to_vec());
            }
        }
        if let Some(metric) = &self.unexpected_index_query {
            let query = lookup(resolved, metric, MetricValue::as_index_query)?;
            payload.unexpected_index_query = Some(query.clone());
        }
        if let Some(metric) = &self.unexpected_rows {
            let rows = lookup(resolved, metric, MetricValue::as_rows)?;
            payload.unexpected_rows = Some(rows.to_vec());
        }

        Ok(MapMetricOutcome { success, payload })
    }
}

fn derived_nonnull(domain: &Kwargs) -> MetricConfiguration {
    MetricConfiguration::new(
        map_metric_name(NONNULL, UNEXPECTED_COUNT),
        domain.clone(),
        Kwargs::new(),
    )
}

/// `part / whole * 100`, or `None` when `whole` is zero.
fn percent(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64 * 100.0)
}

fn truncated<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items.iter().take(limit).cloned().collect()
}

fn unresolved(resolved: &ResolvedMetrics, metric: &MetricConfiguration) -> ValidationError {
    resolved
        .failure(metric)
        .cloned()
        .unwrap_or_else(|| ValidationError::metric(metric.metric_name(), "metric was not resolved"))
}

fn lookup<'a, T: ?Sized>(
    resolved: &'a ResolvedMetrics,
    metric: &MetricConfiguration,
    read: impl Fn(&'a MetricValue) -> Option<&'a T>,
) -> MetricResult<&'a T> {
    let value = resolved.get(metric).ok_or_else(|| unresolved(resolved, metric))?;
    read(value).ok_or_else(|| {
        ValidationError::metric(metric.metric_name(), "resolved value has an unexpected kind")
    })
}

fn count(resolved: &ResolvedMetrics, metric: &MetricConfiguration) -> MetricResult<usize> {
    let value = resolved.get(metric).ok_or_else(|| unresolved(resolved, metric))?;
    value.as_count().ok_or_else(|| match value.as_scalar() {
        Some(DataValue::Float(f)) if *f >= 0.0 => {
            ValidationError::metric(metric.metric_name(), format!("count {f} is not integral"))
        }
        _ => ValidationError::metric(metric.metric_name(), "resolved value is not a count"),
    })
}
