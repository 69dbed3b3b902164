//! One entry in a compiled pipeline.

use crate::core::StageKind;
use crate::stages::{Stage, StageRunner};
use std::sync::Arc;

/// Declaration of one stage: its runner, kind, dependencies, and whether
/// it tolerates skipped upstreams.
///
/// Dependencies keep declaration order (deduplicated); that order decides
/// how `StageInputs::get` resolves key lookups.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Unique name within the pipeline.
    pub name: String,
    /// How the stage is instantiated for execution.
    pub runner: StageRunner,
    /// Advisory categorization.
    pub kind: StageKind,
    /// Names of upstream stages, in declaration order, deduplicated.
    pub dependencies: Vec<String>,
    /// True when the stage may run even if an upstream was skipped.
    pub conditional: bool,
}

impl StageSpec {
    /// A spec with no dependencies and the runner's own kind.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: impl Into<StageRunner>) -> Self {
        let runner = runner.into();
        let kind = match &runner {
            StageRunner::Shared(stage) => stage.kind(),
            StageRunner::Factory(_) => StageKind::Work,
        };
        Self {
            name: name.into(),
            runner,
            kind,
            dependencies: Vec::new(),
            conditional: false,
        }
    }

    /// A spec built from a shared stage instance, taking its name and kind.
    #[must_use]
    pub fn from_stage(stage: Arc<dyn Stage>) -> Self {
        let name = stage.name().to_string();
        let kind = stage.kind();
        Self {
            name,
            runner: StageRunner::Shared(stage),
            kind,
            dependencies: Vec::new(),
            conditional: false,
        }
    }

    /// Overrides the advisory kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds one dependency, ignoring duplicates.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Adds several dependencies, preserving order and ignoring duplicates.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    /// Marks the stage as tolerating skipped upstreams.
    #[must_use]
    pub fn conditional(mut self) -> Self {
        self.conditional = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn spec_builder() {
        let spec = StageSpec::new("summarize", noop("summarize"))
            .with_kind(StageKind::Transform)
            .with_dependencies(["upper", "reverse"])
            .conditional();

        assert_eq!(spec.name, "summarize");
        assert_eq!(spec.kind, StageKind::Transform);
        assert_eq!(spec.dependencies, vec!["upper", "reverse"]);
        assert!(spec.conditional);
    }

    #[test]
    fn dependencies_dedupe_but_keep_order() {
        let spec = StageSpec::new("c", noop("c"))
            .with_dependency("b")
            .with_dependency("a")
            .with_dependency("b");
        assert_eq!(spec.dependencies, vec!["b", "a"]);
    }

    #[test]
    fn from_stage_takes_name_and_kind() {
        let spec = StageSpec::from_stage(noop("echo"));
        assert_eq!(spec.name, "echo");
        assert_eq!(spec.kind, StageKind::Work);
        assert!(spec.dependencies.is_empty());
    }
}
