//! Runs a graph in a forked child context.

use super::{ChildRunTracker, SubpipelineResult};
use crate::context::{ForkOptions, PipelineContext};
use crate::errors::StageflowError;
use crate::pipeline::{RunOutcome, StageGraph};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Default bound on nesting depth.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Spawns child pipeline runs with depth enforcement and lifecycle
/// events.
pub struct SubpipelineSpawner {
    tracker: Arc<ChildRunTracker>,
    max_depth: u32,
}

impl SubpipelineSpawner {
    /// A spawner recording children in `tracker`.
    #[must_use]
    pub fn new(tracker: Arc<ChildRunTracker>) -> Self {
        Self {
            tracker,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Overrides the nesting depth bound.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The tracker recording live children.
    #[must_use]
    pub fn tracker(&self) -> &Arc<ChildRunTracker> {
        &self.tracker
    }

    /// Forks a child context off `parent` and runs `graph` in it.
    ///
    /// The child's failure or cancellation is returned as data in the
    /// [`SubpipelineResult`]; only depth exhaustion is an error here, so
    /// the spawning stage can decide what to propagate.
    ///
    /// # Errors
    ///
    /// Returns an error when `current_depth` has reached the configured
    /// maximum.
    pub async fn spawn(
        &self,
        parent: &Arc<PipelineContext>,
        graph: &StageGraph,
        options: ForkOptions,
        current_depth: u32,
    ) -> Result<SubpipelineResult, StageflowError> {
        if current_depth >= self.max_depth {
            return Err(StageflowError::StageExecution {
                stage: options.parent_stage_id,
                original: format!("subpipeline depth limit ({}) reached", self.max_depth),
            });
        }

        let child = parent.fork(options);
        let child_run_id = child.pipeline_run_id().unwrap_or_else(Uuid::new_v4);
        let parent_run_id = parent.pipeline_run_id().unwrap_or_default();
        self.tracker.register(parent_run_id, child_run_id);

        parent.try_emit_event(
            "pipeline.spawned_child",
            json!({
                "child_run_id": child_run_id.to_string(),
                "pipeline": graph.name(),
                "depth": current_depth + 1,
            }),
        );
        debug!(
            child = %child_run_id,
            pipeline = graph.name(),
            depth = current_depth + 1,
            "spawning subpipeline"
        );

        let started_ms = parent.timer().elapsed_ms();
        let run = graph.run(child.clone()).await;
        let duration_ms = parent.timer().elapsed_ms().saturating_sub(started_ms);

        self.tracker.unregister(parent_run_id, child_run_id);

        match run {
            Ok(RunOutcome::Completed { outputs, .. }) => {
                parent.try_emit_event(
                    "pipeline.child_completed",
                    json!({
                        "child_run_id": child_run_id.to_string(),
                        "duration_ms": duration_ms,
                    }),
                );
                Ok(SubpipelineResult::completed(child_run_id, outputs, duration_ms))
            }
            Ok(RunOutcome::Cancelled { reason, outputs, .. }) => {
                parent.try_emit_event(
                    "pipeline.child_cancelled",
                    json!({
                        "child_run_id": child_run_id.to_string(),
                        "reason": &reason,
                    }),
                );
                Ok(SubpipelineResult::cancelled(
                    child_run_id,
                    reason,
                    outputs,
                    duration_ms,
                ))
            }
            Err(error) => {
                parent.try_emit_event(
                    "pipeline.child_failed",
                    json!({
                        "child_run_id": child_run_id.to_string(),
                        "error": error.to_string(),
                    }),
                );
                Ok(SubpipelineResult::failed(
                    child_run_id,
                    error.to_string(),
                    duration_ms,
                ))
            }
        }
    }
}

impl Default for SubpipelineSpawner {
    fn default() -> Self {
        Self::new(Arc::new(ChildRunTracker::new()))
    }
}
