//! The stage contract and registration helpers.
//!
//! A stage is a named asynchronous unit of work. Implementers provide a
//! name, a kind, and `execute`; nothing else. Failures are reported through
//! [`StageOutput::fail`], not panics.

mod ports;

pub use ports::{AudioPorts, CorePorts, LlmPorts, StagePorts};

use crate::context::StageContext;
use crate::core::{StageKind, StageOutput};
use async_trait::async_trait;
use std::sync::Arc;

/// A named, asynchronous unit of pipeline work.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name within a pipeline.
    fn name(&self) -> &str;

    /// Advisory categorization; does not affect scheduling.
    fn kind(&self) -> StageKind {
        StageKind::Work
    }

    /// Runs the stage against its context.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// How a stage is instantiated for execution.
///
/// A `Shared` runner is one instance reused across runs and must be safe
/// to invoke concurrently. A `Factory` runner builds a fresh instance per
/// run.
#[derive(Clone)]
pub enum StageRunner {
    /// One ready instance shared across runs.
    Shared(Arc<dyn Stage>),
    /// A constructor invoked once per run.
    Factory(Arc<dyn Fn() -> Arc<dyn Stage> + Send + Sync>),
}

impl StageRunner {
    /// Wraps a factory closure.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    /// Resolves the stage instance to execute.
    #[must_use]
    pub fn instantiate(&self) -> Arc<dyn Stage> {
        match self {
            Self::Shared(stage) => stage.clone(),
            Self::Factory(factory) => factory(),
        }
    }
}

impl From<Arc<dyn Stage>> for StageRunner {
    fn from(stage: Arc<dyn Stage>) -> Self {
        Self::Shared(stage)
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared(stage) => f.debug_tuple("Shared").field(&stage.name()).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// A stage backed by an async closure.
pub struct FnStage<F> {
    name: String,
    kind: StageKind,
    body: F,
}

impl<F, Fut> FnStage<F>
where
    F: Fn(&StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StageOutput> + Send,
{
    /// A closure stage with the default kind.
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Work,
            body,
        }
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StageOutput> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        (self.body)(ctx).await
    }
}

/// A stage that succeeds with no output. Useful as a placeholder and in
/// tests.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// A no-op stage with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::ok_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSnapshot, PipelineContext, StageInputs};

    fn stage_ctx() -> StageContext {
        StageContext::new(
            Arc::new(PipelineContext::from_snapshot(ContextSnapshot::new())),
            "test",
            StageKind::Work,
            StageInputs::default(),
        )
    }

    #[tokio::test]
    async fn fn_stage_runs_its_body() {
        let stage = FnStage::new("double", |_ctx| async {
            StageOutput::ok_value("n", serde_json::json!(42))
        })
        .with_kind(StageKind::Transform);

        assert_eq!(stage.name(), "double");
        assert_eq!(stage.kind(), StageKind::Transform);

        let output = stage.execute(&stage_ctx()).await;
        assert_eq!(output.get("n"), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn noop_stage_succeeds() {
        let stage = NoOpStage::new("noop");
        let output = stage.execute(&stage_ctx()).await;
        assert!(output.is_success());
        assert!(output.data.is_empty());
    }

    #[test]
    fn shared_runner_reuses_the_instance() {
        let stage: Arc<dyn Stage> = Arc::new(NoOpStage::new("shared"));
        let runner = StageRunner::from(stage.clone());
        assert!(Arc::ptr_eq(&runner.instantiate(), &stage));
    }

    #[test]
    fn factory_runner_builds_fresh_instances() {
        let runner = StageRunner::factory(|| {
            let stage: Arc<dyn Stage> = Arc::new(NoOpStage::new("fresh"));
            stage
        });
        let first = runner.instantiate();
        let second = runner.instantiate();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "fresh");
    }
}
