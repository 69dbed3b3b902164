//! The fluent, immutable pipeline declaration DSL.

use super::{validate, StageGraph, StageSpec};
use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::interceptors::Interceptor;
use crate::stages::StageRunner;
use std::sync::Arc;

/// Accumulates stage declarations and builds a validated [`StageGraph`].
///
/// Every method consumes and returns the builder, so declarations chain
/// and partially-applied builders can be cloned and reused. Declaring a
/// stage under an existing name replaces the earlier declaration in
/// place. The builder performs no I/O and emits no events; all checking
/// happens in [`build`](Self::build).
#[derive(Clone, Default)]
pub struct Pipeline {
    name: String,
    specs: Vec<StageSpec>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Pipeline {
    /// An empty pipeline with a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specs: Vec::new(),
            interceptors: Vec::new(),
        }
    }

    /// Declares a stage with no dependencies.
    #[must_use]
    pub fn with_stage(
        self,
        name: impl Into<String>,
        runner: impl Into<StageRunner>,
        kind: StageKind,
    ) -> Self {
        self.with_stage_spec(StageSpec::new(name, runner).with_kind(kind))
    }

    /// Declares a stage depending on earlier stages.
    #[must_use]
    pub fn with_dependent_stage(
        self,
        name: impl Into<String>,
        runner: impl Into<StageRunner>,
        kind: StageKind,
        dependencies: &[&str],
    ) -> Self {
        self.with_stage_spec(
            StageSpec::new(name, runner)
                .with_kind(kind)
                .with_dependencies(dependencies.iter().copied()),
        )
    }

    /// Declares a stage that tolerates skipped upstreams.
    #[must_use]
    pub fn with_conditional_stage(
        self,
        name: impl Into<String>,
        runner: impl Into<StageRunner>,
        kind: StageKind,
        dependencies: &[&str],
    ) -> Self {
        self.with_stage_spec(
            StageSpec::new(name, runner)
                .with_kind(kind)
                .with_dependencies(dependencies.iter().copied())
                .conditional(),
        )
    }

    /// Declares a stage from a full spec. Replaces any earlier declaration
    /// with the same name, keeping its position.
    #[must_use]
    pub fn with_stage_spec(mut self, spec: StageSpec) -> Self {
        match self.specs.iter().position(|s| s.name == spec.name) {
            Some(index) => self.specs[index] = spec,
            None => self.specs.push(spec),
        }
        self
    }

    /// Binds an interceptor to every graph built from this pipeline.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Unions this pipeline with another. On a name collision the
    /// right-hand declaration wins; interceptors concatenate.
    #[must_use]
    pub fn compose(mut self, other: Self) -> Self {
        for spec in other.specs {
            self = self.with_stage_spec(spec);
        }
        self.interceptors.extend(other.interceptors);
        self
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.specs.len()
    }

    /// Declared stage names, in declaration order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    /// Validates the declarations and compiles the executable graph.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineValidationError`] when the pipeline is empty,
    /// references an unknown dependency, or contains a cycle.
    pub fn build(self) -> Result<StageGraph, PipelineValidationError> {
        validate::validate(&self.specs)?;
        Ok(StageGraph::compile(self.name, self.specs, self.interceptors))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineValidationError;
    use crate::stages::{NoOpStage, Stage};

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn declarations_accumulate() {
        let pipeline = Pipeline::new("demo")
            .with_stage("fetch", noop("fetch"), StageKind::Enrich)
            .with_dependent_stage("process", noop("process"), StageKind::Transform, &["fetch"]);

        assert_eq!(pipeline.name(), "demo");
        assert_eq!(pipeline.stage_count(), 2);
        assert_eq!(pipeline.stage_names(), vec!["fetch", "process"]);
    }

    #[test]
    fn later_declaration_replaces_earlier_in_place() {
        let pipeline = Pipeline::new("demo")
            .with_stage("a", noop("a"), StageKind::Work)
            .with_stage("b", noop("b"), StageKind::Work)
            .with_dependent_stage("a", noop("a"), StageKind::Guard, &["b"]);

        assert_eq!(pipeline.stage_count(), 2);
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);

        let graph = pipeline.build().unwrap();
        let spec = graph.spec("a").unwrap();
        assert_eq!(spec.kind, StageKind::Guard);
        assert_eq!(spec.dependencies, vec!["b"]);
    }

    #[test]
    fn compose_right_hand_wins() {
        let left = Pipeline::new("left")
            .with_stage("shared", noop("shared"), StageKind::Work)
            .with_stage("only_left", noop("only_left"), StageKind::Work);
        let right = Pipeline::new("right")
            .with_stage("shared", noop("shared"), StageKind::Route)
            .with_stage("only_right", noop("only_right"), StageKind::Work);

        let composed = left.compose(right);
        assert_eq!(composed.stage_count(), 3);
        let graph = composed.build().unwrap();
        assert_eq!(graph.spec("shared").unwrap().kind, StageKind::Route);
    }

    #[test]
    fn build_rejects_empty() {
        let err = Pipeline::new("empty").build().unwrap_err();
        assert_eq!(err, PipelineValidationError::EmptyPipeline);
    }

    #[test]
    fn build_rejects_missing_dependency() {
        let err = Pipeline::new("demo")
            .with_dependent_stage("b", noop("b"), StageKind::Work, &["missing"])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_DEPENDENCY");
    }

    #[test]
    fn build_rejects_cycles_with_path() {
        let err = Pipeline::new("demo")
            .with_dependent_stage("a", noop("a"), StageKind::Work, &["b"])
            .with_dependent_stage("b", noop("b"), StageKind::Work, &["c"])
            .with_dependent_stage("c", noop("c"), StageKind::Work, &["a"])
            .build()
            .unwrap_err();

        assert_eq!(err.code(), "CYCLE_DETECTED");
        assert_eq!(err.cycle_path().unwrap(), &["a", "b", "c", "a"]);
    }

    #[test]
    fn build_is_deterministic() {
        let declare = || {
            Pipeline::new("demo")
                .with_stage("a", noop("a"), StageKind::Work)
                .with_dependent_stage("b", noop("b"), StageKind::Work, &["a"])
        };
        let first = declare().build().unwrap();
        let second = declare().build().unwrap();
        assert_eq!(first.topo_order(), second.topo_order());
    }

    #[test]
    fn builder_clones_are_independent() {
        let base = Pipeline::new("base").with_stage("a", noop("a"), StageKind::Work);
        let extended = base
            .clone()
            .with_stage("b", noop("b"), StageKind::Work);

        assert_eq!(base.stage_count(), 1);
        assert_eq!(extended.stage_count(), 2);
    }
}
