//! Dependency graph resolver.
//!
//! [`GraphResolver::resolve`] expands the requested metrics into the transitive
//! closure of their dependencies, rejects cycles, and computes the graph in rounds:
//! every node whose dependencies are settled is computed in the current round, and
//! the aggregate partials that become ready together are handed to the backend as
//! one bundle. Values are memoised for the duration of the call only.

use crate::execution::{AggregateRequest, ExecutionEngine};
use crate::registry::{
    MetricContext, MetricDependencies, MetricImplementation, MetricProvider, MetricRegistry,
    MetricValue,
};
use crate::{Batch, MetricResult, ValidationError};
use expectations_core::{ConfigurationError, MetricConfiguration};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Values and failures of one resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMetrics {
    values: HashMap<MetricConfiguration, MetricValue>,
    failures: HashMap<MetricConfiguration, ValidationError>,
}

impl ResolvedMetrics {
    /// Value of `metric`, if it resolved.
    pub fn get(&self, metric: &MetricConfiguration) -> Option<&MetricValue> {
        self.values.get(metric)
    }

    /// Failure recorded for `metric`, if any.
    pub fn failure(&self, metric: &MetricConfiguration) -> Option<&ValidationError> {
        self.failures.get(metric)
    }

    pub fn is_resolved(&self, metric: &MetricConfiguration) -> bool {
        self.values.contains_key(metric)
    }

    pub fn values(&self) -> &HashMap<MetricConfiguration, MetricValue> {
        &self.values
    }

    pub fn failures(&self) -> &HashMap<MetricConfiguration, ValidationError> {
        &self.failures
    }

    /// Number of resolved metrics, dependencies included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

struct Node<'r> {
    configuration: MetricConfiguration,
    provider: Option<&'r MetricProvider>,
    dependencies: MetricDependencies,
}

/// Resolves metric graphs against a registry.
#[derive(Debug, Clone, Copy)]
pub struct GraphResolver<'r> {
    registry: &'r MetricRegistry,
}

impl<'r> GraphResolver<'r> {
    pub fn new(registry: &'r MetricRegistry) -> Self {
        Self { registry }
    }

    /// Resolves `metrics` and everything they depend on.
    ///
    /// With `catch_exceptions` a failing node only marks its dependents as
    /// unresolved; otherwise the first failure is returned. Configuration errors
    /// (cycles, unknown identifier columns, foreign batch ids) are always returned.
    ///
    /// Blocking: must not be called from inside a Tokio runtime.
    pub fn resolve(
        &self,
        engine: &ExecutionEngine,
        batch: &Batch,
        metrics: &[MetricConfiguration],
        catch_exceptions: bool,
    ) -> MetricResult<ResolvedMetrics> {
        engine.check_batch(batch)?;
        let mut resolved = ResolvedMetrics::default();

        let nodes = self.expand(engine, batch, metrics, catch_exceptions, &mut resolved)?;
        check_acyclic(&nodes)?;
        debug!(
            "Resolving {} metrics ({} requested) on {}",
            nodes.len(),
            metrics.len(),
            engine.kind()
        );

        let mut pending: Vec<&Node<'r>> = nodes
            .iter()
            .filter(|node| !resolved.failures.contains_key(&node.configuration))
            .collect();

        while !pending.is_empty() {
            let settled = |c: &MetricConfiguration| {
                resolved.values.contains_key(c) || resolved.failures.contains_key(c)
            };
            let (ready, waiting): (Vec<&Node<'r>>, Vec<&Node<'r>>) = pending
                .into_iter()
                .partition(|node| node.dependencies.values().all(|d| settled(d)));
            pending = waiting;

            if ready.is_empty() {
                return Err(cycle_error(pending.iter().map(|n| &n.configuration)).into());
            }

            let mut bundle: Vec<AggregateRequest> = Vec::new();
            let mut bundle_owners: Vec<&MetricConfiguration> = Vec::new();
            let mut outcomes: Vec<(&MetricConfiguration, MetricResult<MetricValue>)> = Vec::new();

            for node in ready {
                let configuration = &node.configuration;
                if let Some(upstream) = node
                    .dependencies
                    .values()
                    .find(|d| resolved.failures.contains_key(*d))
                {
                    let err = ValidationError::upstream(configuration.metric_name(), upstream.metric_name());
                    outcomes.push((configuration, Err(err)));
                    continue;
                }
                let Some(provider) = node.provider else {
                    continue;
                };

                let ctx = MetricContext::new(
                    engine,
                    batch,
                    configuration,
                    &node.dependencies,
                    &resolved.values,
                );
                match provider.implementation() {
                    MetricImplementation::Value(compute) => {
                        outcomes.push((configuration, compute(&ctx)));
                    }
                    MetricImplementation::AggregatePartial(partial) => match partial(&ctx) {
                        Ok(request) => {
                            bundle.push(request);
                            bundle_owners.push(configuration);
                        }
                        Err(err) => outcomes.push((configuration, Err(err))),
                    },
                }
            }

            if !bundle.is_empty() {
                debug!("Evaluating a bundle of {} aggregate partials", bundle.len());
                let results = engine.resolve_metric_bundle(batch, &bundle);
                for (configuration, result) in bundle_owners.into_iter().zip(results) {
                    outcomes.push((configuration, result.map(MetricValue::Scalar)));
                }
            }

            for (configuration, outcome) in outcomes {
                match outcome {
                    Ok(value) => {
                        debug!("Resolved {}", configuration);
                        resolved.values.insert(configuration.clone(), value);
                    }
                    Err(err) => {
                        record_failure(&mut resolved, configuration, err, catch_exceptions)?
                    }
                }
            }
        }

        Ok(resolved)
    }

    fn expand(
        &self,
        engine: &ExecutionEngine,
        batch: &Batch,
        metrics: &[MetricConfiguration],
        catch_exceptions: bool,
        resolved: &mut ResolvedMetrics,
    ) -> MetricResult<Vec<Node<'r>>> {
        let mut nodes: Vec<Node<'r>> = Vec::new();
        let mut seen: HashSet<MetricConfiguration> = HashSet::new();
        let mut queue: VecDeque<MetricConfiguration> = metrics.iter().cloned().collect();

        while let Some(configuration) = queue.pop_front() {
            if !seen.insert(configuration.clone()) {
                continue;
            }
            if let Some(requested) = configuration.batch_id() {
                if requested != batch.id() {
                    return Err(ConfigurationError::BatchMismatch {
                        requested: requested.to_string(),
                        active: batch.id().to_string(),
                    }
                    .into());
                }
            }
            let lookup = self
                .registry
                .get(configuration.metric_name(), engine.kind())
                .and_then(|provider| Ok((provider, provider.dependencies(&configuration)?)));
            match lookup {
                Ok((provider, dependencies)) => {
                    queue.extend(dependencies.values().cloned());
                    nodes.push(Node {
                        configuration,
                        provider: Some(provider),
                        dependencies,
                    });
                }
                Err(err) => {
                    record_failure(resolved, &configuration, err, catch_exceptions)?;
                    nodes.push(Node {
                        configuration,
                        provider: None,
                        dependencies: MetricDependencies::new(),
                    });
                }
            }
        }
        Ok(nodes)
    }
}

fn record_failure(
    resolved: &mut ResolvedMetrics,
    configuration: &MetricConfiguration,
    err: ValidationError,
    catch_exceptions: bool,
) -> MetricResult<()> {
    if err.is_configuration() || !catch_exceptions {
        return Err(err);
    }
    if !matches!(err, ValidationError::UpstreamFailed { .. }) {
        warn!("Metric {} failed: {}", configuration, err);
    }
    resolved.failures.insert(configuration.clone(), err);
    Ok(())
}

fn cycle_error<'a>(members: impl Iterator<Item = &'a MetricConfiguration>) -> ConfigurationError {
    let mut names: Vec<String> = members.map(|c| c.metric_name().to_string()).collect();
    names.sort();
    names.dedup();
    ConfigurationError::DependencyCycle { metrics: names }
}

/// Kahn's algorithm over the expanded graph.
fn check_acyclic(nodes: &[Node<'_>]) -> MetricResult<()> {
    let position: HashMap<&MetricConfiguration, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (&n.configuration, i))
        .collect();
    let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for dependency in node.dependencies.values() {
            if let Some(&d) = position.get(dependency) {
                dependents[d].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0;
    while let Some(i) = queue.pop_front() {
        visited += 1;
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if visited == nodes.len() {
        Ok(())
    } else {
        let members = nodes
            .iter()
            .zip(&in_degree)
            .filter(|(_, degree)| **degree > 0)
            .map(|(n, _)| &n.configuration);
        Err(cycle_error(members).into())
    }
}
