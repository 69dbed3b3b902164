//! Approval-gated tool execution with an undo stack.

use super::{ToolDefinition, ToolInput, ToolOutput, ToolRegistry};
use crate::errors::ToolError;
use crate::events::{EventSink, NoOpEventSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a gated invocation may proceed.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Returns `true` to approve, `false` to deny.
    async fn request(&self, tool: &ToolDefinition, input: &ToolInput) -> bool;
}

/// Approves everything. The default gate for ungated setups and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn request(&self, _tool: &ToolDefinition, _input: &ToolInput) -> bool {
        true
    }
}

/// One revertible invocation.
#[derive(Debug, Clone)]
pub struct UndoRecord {
    /// The tool that ran.
    pub tool: String,
    /// The token the tool accepts in `undo`.
    pub token: String,
}

/// Looks tools up, runs the approval gate, invokes, and keeps an undo
/// stack of revertible invocations.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    gate: Arc<dyn ApprovalGate>,
    approval_timeout: Duration,
    sink: Arc<dyn EventSink>,
    undo_stack: Mutex<Vec<UndoRecord>>,
}

impl ToolExecutor {
    /// An executor over a registry, auto-approving gated tools.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            gate: Arc::new(AutoApprove),
            approval_timeout: Duration::from_secs(60),
            sink: Arc::new(NoOpEventSink),
            undo_stack: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the approval gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Bounds how long an approval decision may take.
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Routes tool lifecycle events into `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Number of revertible invocations on the stack.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.lock().len()
    }

    /// Executes one tool invocation.
    ///
    /// # Errors
    ///
    /// Returns the tool taxonomy errors: `NotFound`, `ApprovalDenied`,
    /// `ApprovalTimeout`, or whatever the tool body raises.
    pub async fn execute(&self, name: &str, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let tool = self.registry.get(name)?;
        let definition = tool.definition().clone();

        self.sink.try_emit(
            "tool.invoked",
            json!({
                "tool": &definition.name,
                "invoked_by": input.invoked_by,
            }),
        );

        if definition.requires_approval {
            let decision =
                tokio::time::timeout(self.approval_timeout, self.gate.request(&definition, &input))
                    .await
                    .map_err(|_| ToolError::ApprovalTimeout {
                        name: definition.name.clone(),
                        timeout_ms: u64::try_from(self.approval_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    })?;
            if !decision {
                self.sink.try_emit(
                    "tool.denied",
                    json!({"tool": &definition.name}),
                );
                return Err(ToolError::ApprovalDenied {
                    name: definition.name,
                });
            }
        }

        match tool.invoke(&input).await {
            Ok(output) => {
                if let Some(token) = &output.undo_token {
                    self.undo_stack.lock().push(UndoRecord {
                        tool: definition.name.clone(),
                        token: token.clone(),
                    });
                }
                self.sink.try_emit(
                    "tool.completed",
                    json!({"tool": &definition.name}),
                );
                Ok(output)
            }
            Err(error) => {
                self.sink.try_emit(
                    "tool.failed",
                    json!({
                        "tool": &definition.name,
                        "error": error.to_string(),
                    }),
                );
                Err(error)
            }
        }
    }

    /// Reverts the most recent revertible invocation.
    ///
    /// # Errors
    ///
    /// Returns `UndoFailed` when the stack is empty or the tool's undo
    /// rejects the token.
    pub async fn undo_last(&self) -> Result<UndoRecord, ToolError> {
        let record = self.undo_stack.lock().pop().ok_or_else(|| ToolError::UndoFailed {
            name: "<none>".to_string(),
            reason: "nothing to undo".to_string(),
        })?;

        let tool = self.registry.get(&record.tool)?;
        tool.undo(&record.token).await?;

        self.sink.try_emit(
            "tool.undone",
            json!({"tool": &record.tool}),
        );
        Ok(record)
    }
}
