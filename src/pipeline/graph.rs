//! The compiled, validated stage graph.

use super::executor::{self, RunOutcome};
use super::StageSpec;
use crate::context::PipelineContext;
use crate::errors::StageflowError;
use crate::interceptors::Interceptor;
use std::collections::HashMap;
use std::sync::Arc;

/// A validated pipeline, ready for execution.
///
/// Compiled once by `Pipeline::build` and immutable afterwards: it carries
/// the stage specs, the precomputed reverse adjacency (dependents), a
/// topological order, and the interceptors bound at declaration time.
pub struct StageGraph {
    name: String,
    specs: Vec<StageSpec>,
    index: HashMap<String, usize>,
    dependents: HashMap<String, Vec<String>>,
    topo_order: Vec<String>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl StageGraph {
    /// Compiles adjacency and ordering for a validated spec list.
    pub(crate) fn compile(
        name: String,
        specs: Vec<StageSpec>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        let index: HashMap<String, usize> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        let mut dependents: HashMap<String, Vec<String>> = specs
            .iter()
            .map(|s| (s.name.clone(), Vec::new()))
            .collect();
        for spec in &specs {
            for dep in &spec.dependencies {
                if let Some(children) = dependents.get_mut(dep) {
                    children.push(spec.name.clone());
                }
            }
        }

        let topo_order = topological_order(&specs);

        Self {
            name,
            specs,
            index,
            dependents,
            topo_order,
            interceptors,
        }
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stages in the graph.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.specs.len()
    }

    /// All specs, in declaration order.
    #[must_use]
    pub fn specs(&self) -> &[StageSpec] {
        &self.specs
    }

    /// The spec for one stage.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&StageSpec> {
        self.index.get(name).map(|i| &self.specs[*i])
    }

    /// Stages that depend on `name`, in declaration order.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map_or(&[], Vec::as_slice)
    }

    /// A dependency-respecting order over all stages.
    #[must_use]
    pub fn topo_order(&self) -> &[String] {
        &self.topo_order
    }

    /// The interceptors bound at declaration time.
    #[must_use]
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    /// Executes the graph with its bound interceptors.
    ///
    /// # Errors
    ///
    /// Returns [`StageflowError::StageExecution`] when a stage fails and
    /// the failure propagates, or [`StageflowError::Deadlock`] when the
    /// scheduler stalls.
    pub async fn run(&self, ctx: Arc<PipelineContext>) -> Result<RunOutcome, StageflowError> {
        executor::execute(self, ctx, None).await
    }

    /// Executes the graph with a per-run interceptor list, overriding the
    /// bound one.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_with_interceptors(
        &self,
        ctx: Arc<PipelineContext>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<RunOutcome, StageflowError> {
        executor::execute(self, ctx, Some(interceptors)).await
    }
}

impl std::fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGraph")
            .field("name", &self.name)
            .field("order", &self.topo_order)
            .finish_non_exhaustive()
    }
}

/// Kahn's algorithm seeded in declaration order, so the result is
/// deterministic for a given builder.
fn topological_order(specs: &[StageSpec]) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = specs
        .iter()
        .map(|s| (s.name.as_str(), s.dependencies.len()))
        .collect();

    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for spec in specs {
        for dep in &spec.dependencies {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(spec.name.as_str());
        }
    }

    let mut queue: Vec<&str> = specs
        .iter()
        .filter(|s| s.dependencies.is_empty())
        .map(|s| s.name.as_str())
        .collect();
    let mut order = Vec::with_capacity(specs.len());
    let mut cursor = 0;

    while cursor < queue.len() {
        let node = queue[cursor];
        cursor += 1;
        order.push(node.to_string());

        if let Some(children) = dependents.get(node) {
            for child in children {
                let degree = in_degree.entry(child).or_insert(0);
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push(child);
                }
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use crate::pipeline::Pipeline;
    use crate::stages::{NoOpStage, Stage};

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    fn diamond() -> StageGraph {
        Pipeline::new("diamond")
            .with_stage("root", noop("root"), StageKind::Work)
            .with_dependent_stage("left", noop("left"), StageKind::Work, &["root"])
            .with_dependent_stage("right", noop("right"), StageKind::Work, &["root"])
            .with_dependent_stage("join", noop("join"), StageKind::Work, &["left", "right"])
            .build()
            .unwrap()
    }

    #[test]
    fn compile_builds_reverse_adjacency() {
        let graph = diamond();
        assert_eq!(graph.dependents_of("root"), &["left", "right"]);
        assert_eq!(graph.dependents_of("left"), &["join"]);
        assert!(graph.dependents_of("join").is_empty());
    }

    #[test]
    fn topo_order_respects_dependencies() {
        let graph = diamond();
        let order = graph.topo_order();
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();

        assert!(pos("root") < pos("left"));
        assert!(pos("root") < pos("right"));
        assert!(pos("left") < pos("join"));
        assert!(pos("right") < pos("join"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn spec_lookup() {
        let graph = diamond();
        assert!(graph.spec("left").is_some());
        assert!(graph.spec("phantom").is_none());
        assert_eq!(graph.stage_count(), 4);
    }
}
