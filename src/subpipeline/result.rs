//! Outcome of one child pipeline run.

use crate::core::StageOutput;
use std::collections::HashMap;
use uuid::Uuid;

/// What a spawned child run produced.
///
/// Child failure is data, not an error: the spawning stage decides whether
/// to propagate it through its own output.
#[derive(Debug, Clone)]
pub struct SubpipelineResult {
    /// The child's run id.
    pub child_run_id: Uuid,
    /// True when the child completed every stage.
    pub success: bool,
    /// True when the child was cancelled.
    pub cancelled: bool,
    /// The child's outputs, complete or partial.
    pub outputs: HashMap<String, StageOutput>,
    /// Failure or cancellation description.
    pub error: Option<String>,
    /// Child run time in milliseconds.
    pub duration_ms: u64,
}

impl SubpipelineResult {
    /// A successful child run.
    #[must_use]
    pub fn completed(
        child_run_id: Uuid,
        outputs: HashMap<String, StageOutput>,
        duration_ms: u64,
    ) -> Self {
        Self {
            child_run_id,
            success: true,
            cancelled: false,
            outputs,
            error: None,
            duration_ms,
        }
    }

    /// A cancelled child run with partial outputs.
    #[must_use]
    pub fn cancelled(
        child_run_id: Uuid,
        reason: impl Into<String>,
        outputs: HashMap<String, StageOutput>,
        duration_ms: u64,
    ) -> Self {
        Self {
            child_run_id,
            success: false,
            cancelled: true,
            outputs,
            error: Some(reason.into()),
            duration_ms,
        }
    }

    /// A failed child run.
    #[must_use]
    pub fn failed(child_run_id: Uuid, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            child_run_id,
            success: false,
            cancelled: false,
            outputs: HashMap::new(),
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// One stage's output from the child run.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&StageOutput> {
        self.outputs.get(stage)
    }
}
