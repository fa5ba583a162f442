//! Main validation engine.
//!
//! [`Validator`] turns expectations into metric requests, resolves them against the
//! active batch in a single graph resolution, and shapes each result through the
//! result format policy.

use crate::expectations::ExpectationCatalog;
use crate::execution::ExecutionEngine;
use crate::policy::MapMetricPlan;
use crate::registry::MetricRegistry;
use crate::resolver::{GraphResolver, ResolvedMetrics};
use crate::{Batch, MetricResult, ValidationError};
use expectations_core::{
    BATCH_ID_KWARG, COLUMN_KWARG, ExceptionInfo, ExpectationConfiguration,
    ExpectationValidationResult, Kwargs, MetricConfiguration, SuiteValidationResult,
    ValidationContext,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Depth limit when following upstream failures back to their cause.
const MAX_CAUSE_DEPTH: usize = 32;

/// Validates expectations against batches of one execution engine.
///
/// # Example
///
/// ```rust
/// use expectations_core::{ExpectationBuilder, ValidationContext};
/// use expectations_validator::{Batch, InProcessEngine, Table, Validator};
///
/// let table = Table::from_rows(
///     &["animals"],
///     vec![vec!["cat".into()], vec!["giraffe".into()]],
/// )
/// .unwrap();
/// let batch = Batch::in_process("animals", table);
/// let validator = Validator::new(InProcessEngine::new());
///
/// let expectation = ExpectationBuilder::in_set("animals", vec!["cat", "fish", "dog"]).build();
/// let report = validator
///     .validate(&batch, &[expectation], &ValidationContext::new())
///     .unwrap();
///
/// assert!(!report.success);
/// assert_eq!(report.results[0].result.unexpected_count, Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct Validator {
    engine: ExecutionEngine,
    registry: Arc<MetricRegistry>,
    catalog: ExpectationCatalog,
}

struct PlannedExpectation<'e> {
    config: &'e ExpectationConfiguration,
    mostly: f64,
    plan: MapMetricPlan,
}

impl Validator {
    /// Creates a validator with the default metric registry and expectation catalog.
    pub fn new(engine: impl Into<ExecutionEngine>) -> Self {
        Self {
            engine: engine.into(),
            registry: Arc::new(MetricRegistry::global().clone()),
            catalog: ExpectationCatalog::builtin(),
        }
    }

    /// Replaces the metric registry.
    pub fn with_registry(mut self, registry: MetricRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replaces the expectation catalog.
    pub fn with_catalog(mut self, catalog: ExpectationCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Resolves arbitrary metrics against `batch`.
    ///
    /// # Errors
    ///
    /// Configuration errors always; metric failures unless `catch_exceptions` is set.
    pub fn resolve(
        &self,
        batch: &Batch,
        metrics: &[MetricConfiguration],
        catch_exceptions: bool,
    ) -> MetricResult<ResolvedMetrics> {
        GraphResolver::new(&self.registry).resolve(&self.engine, batch, metrics, catch_exceptions)
    }

    /// Validates `expectations` against `batch`.
    ///
    /// Result formats and kwargs of every expectation are checked before any metric
    /// is computed, and all metrics are resolved in a single pass so that shared
    /// metrics are computed once.
    ///
    /// # Errors
    ///
    /// Configuration errors always abort the run. Metric failures abort it only when
    /// `context.catch_exceptions` is false; otherwise they are embedded in the
    /// affected results.
    pub fn validate(
        &self,
        batch: &Batch,
        expectations: &[ExpectationConfiguration],
        context: &ValidationContext,
    ) -> MetricResult<SuiteValidationResult> {
        let start = Instant::now();
        info!(
            batch = batch.id(),
            backend = %self.engine.kind(),
            expectations = expectations.len(),
            "Starting validation"
        );

        let planned = expectations
            .iter()
            .map(|config| self.plan(batch, config, context))
            .collect::<MetricResult<Vec<_>>>()?;

        let metrics: Vec<MetricConfiguration> =
            planned.iter().flat_map(|p| p.plan.metrics()).collect();
        debug!(metrics = metrics.len(), "Planned metrics");
        let resolved = self.resolve(batch, &metrics, context.catch_exceptions)?;

        let mut results = Vec::with_capacity(planned.len());
        for expectation in planned {
            results.push(self.evaluate(expectation, &resolved, context)?);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let report = SuiteValidationResult::new(
            results,
            resolved.len(),
            duration_ms,
            context.metadata.clone(),
        );
        info!(
            batch = batch.id(),
            successful = report.statistics.successful_expectations,
            evaluated = report.statistics.evaluated_expectations,
            duration_ms,
            "Validation completed"
        );
        Ok(report)
    }

    /// Validates a single expectation.
    pub fn validate_expectation(
        &self,
        batch: &Batch,
        expectation: &ExpectationConfiguration,
        context: &ValidationContext,
    ) -> MetricResult<ExpectationValidationResult> {
        let report = self.validate(batch, std::slice::from_ref(expectation), context)?;
        report
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ValidationError::backend("validation produced no result"))
    }

    fn plan<'e>(
        &self,
        batch: &Batch,
        config: &'e ExpectationConfiguration,
        context: &ValidationContext,
    ) -> MetricResult<PlannedExpectation<'e>> {
        let entry = self.catalog.get(&config.expectation_type)?;
        let format = config.effective_result_format(context.result_format.as_ref())?;
        let mostly = config.mostly()?;
        let domain = Kwargs::new()
            .with(BATCH_ID_KWARG, batch.id())
            .with(COLUMN_KWARG, config.column()?);

        let plan = MapMetricPlan::new(
            entry.map_metric(),
            entry.filter_column_isnull(),
            &domain,
            &entry.value_kwargs(config),
            &format,
            self.engine.kind(),
        );
        Ok(PlannedExpectation {
            config,
            mostly,
            plan,
        })
    }

    fn evaluate(
        &self,
        expectation: PlannedExpectation<'_>,
        resolved: &ResolvedMetrics,
        context: &ValidationContext,
    ) -> MetricResult<ExpectationValidationResult> {
        match expectation.plan.evaluate(resolved, expectation.mostly) {
            Ok(outcome) => Ok(ExpectationValidationResult {
                success: outcome.success,
                expectation_config: expectation.config.clone(),
                result: outcome.payload,
                exception_info: ExceptionInfo::default(),
            }),
            Err(err) if context.catch_exceptions && !err.is_configuration() => {
                let failed = expectation.plan.failed_metrics(resolved);
                let cause = root_cause(resolved, err);
                warn!(
                    expectation = %expectation.config.expectation_type,
                    error = %cause,
                    "Expectation could not be evaluated"
                );
                Ok(ExpectationValidationResult::from_exception(
                    expectation.config.clone(),
                    ExceptionInfo::raised(
                        cause.to_string(),
                        failed.iter().map(ToString::to_string).collect(),
                    ),
                ))
            }
            Err(err) => Err(err),
        }
    }
}

/// Follows upstream failures back to the failure that caused them.
fn root_cause(resolved: &ResolvedMetrics, mut err: ValidationError) -> ValidationError {
    for _ in 0..MAX_CAUSE_DEPTH {
        let ValidationError::UpstreamFailed { upstream, .. } = &err else {
            break;
        };
        let next = resolved
            .failures()
            .iter()
            .filter(|(metric, _)| metric.metric_name() == upstream)
            .map(|(_, failure)| failure)
            .find(|failure| !matches!(failure, ValidationError::UpstreamFailed { .. }))
            .or_else(|| {
                resolved
                    .failures()
                    .iter()
                    .find(|(metric, _)| metric.metric_name() == upstream)
                    .map(|(_, failure)| failure)
            });
        match next {
            Some(failure) => err = failure.clone(),
            None => break,
        }
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InProcessEngine, Table};
    use expectations_core::{DataValue, ExpectationBuilder, ResultFormatSpec};
    use pretty_assertions::assert_eq;

    fn batch() -> Batch {
        let table = Table::from_rows(
            &["animals"],
            vec![
                vec!["cat".into()],
                vec!["fish".into()],
                vec![DataValue::Null],
                vec!["giraffe".into()],
            ],
        )
        .unwrap();
        Batch::in_process("b1", table)
    }

    #[test]
    fn test_missing_values_are_not_unexpected() {
        let validator = Validator::new(InProcessEngine::new());
        let expectation = ExpectationBuilder::in_set("animals", vec!["cat", "fish"]).build();
        let result = validator
            .validate_expectation(&batch(), &expectation, &ValidationContext::new())
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.result.element_count, Some(4));
        assert_eq!(result.result.missing_count, Some(1));
        assert_eq!(result.result.unexpected_count, Some(1));
        assert_eq!(
            result.result.partial_unexpected_list,
            Some(vec![DataValue::from("giraffe")])
        );
    }

    #[test]
    fn test_mostly_threshold() {
        let validator = Validator::new(InProcessEngine::new());
        let expectation = ExpectationBuilder::in_set("animals", vec!["cat", "fish"])
            .mostly(0.6)
            .build();
        let result = validator
            .validate_expectation(&batch(), &expectation, &ValidationContext::new())
            .unwrap();
        assert!(result.success);
    }

    #[test]
    fn test_unknown_expectation_type_aborts() {
        let validator = Validator::new(InProcessEngine::new());
        let expectation = ExpectationBuilder::new("expect_column_to_sparkle")
            .column("animals")
            .build();
        let err = validator
            .validate(&batch(), &[expectation], &ValidationContext::new())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_run_level_format_aborts() {
        let validator = Validator::new(InProcessEngine::new());
        let context =
            ValidationContext::new().with_result_format(ResultFormatSpec::Level("VERBOSE".into()));
        let expectation = ExpectationBuilder::not_null("animals").build();
        let err = validator
            .validate(&batch(), &[expectation], &context)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_column_is_caught() {
        let validator = Validator::new(InProcessEngine::new());
        let broken = ExpectationBuilder::not_null("legs").build();
        let healthy = ExpectationBuilder::not_null("animals").build();
        let report = validator
            .validate(&batch(), &[broken, healthy], &ValidationContext::new())
            .unwrap();

        let broken = &report.results[0];
        assert!(!broken.success);
        assert!(broken.exception_info.raised_exception);
        assert!(broken
            .exception_info
            .exception_message
            .as_deref()
            .unwrap()
            .contains("legs"));
        assert!(!broken.exception_info.failed_metrics.is_empty());
        assert!(!report.results[1].exception_info.raised_exception);
        assert_eq!(report.results[1].result.unexpected_count, Some(1));
    }

    #[test]
    fn test_missing_column_propagates_without_catch() {
        let validator = Validator::new(InProcessEngine::new());
        let broken = ExpectationBuilder::not_null("legs").build();
        let context = ValidationContext::new().with_catch_exceptions(false);
        assert!(validator.validate(&batch(), &[broken], &context).is_err());
    }
}
