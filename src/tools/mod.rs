//! Optional tool-execution helper: definitions, registry, and the
//! approval-gated executor with undo support.
//!
//! Stages that expose tool calling to an agent use this module; the
//! pipeline engine itself never touches it.

mod executor;
mod registry;

pub use executor::{ApprovalGate, AutoApprove, ToolExecutor, UndoRecord};
pub use registry::ToolRegistry;

use crate::errors::ToolError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Static description of a tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to approvers and agents.
    pub description: String,
    /// JSON schema of the accepted arguments.
    pub parameters: serde_json::Value,
    /// True when every invocation needs an approval decision.
    pub requires_approval: bool,
    /// True when invocations can be reverted.
    pub supports_undo: bool,
}

impl ToolDefinition {
    /// A definition with an empty parameter schema and no gating.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            requires_approval: false,
            supports_undo: false,
        }
    }

    /// Sets the argument schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Requires an approval decision per invocation.
    #[must_use]
    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Marks invocations as revertible.
    #[must_use]
    pub fn with_undo(mut self) -> Self {
        self.supports_undo = true;
        self
    }
}

/// Arguments for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolInput {
    /// Argument values keyed by parameter name.
    pub arguments: HashMap<String, serde_json::Value>,
    /// Who requested the invocation, for audit events.
    pub invoked_by: Option<String>,
}

impl ToolInput {
    /// An empty input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Names the requester.
    #[must_use]
    pub fn invoked_by(mut self, who: impl Into<String>) -> Self {
        self.invoked_by = Some(who.into());
        self
    }
}

/// What an invocation produced.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// The tool's result payload.
    pub result: serde_json::Value,
    /// Opaque token the tool accepts in `undo`, when revertible.
    pub undo_token: Option<String>,
}

impl ToolOutput {
    /// A result with no undo token.
    #[must_use]
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            undo_token: None,
        }
    }

    /// Attaches an undo token.
    #[must_use]
    pub fn with_undo_token(mut self, token: impl Into<String>) -> Self {
        self.undo_token = Some(token.into());
        self
    }
}

/// An invocable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's static description.
    fn definition(&self) -> &ToolDefinition;

    /// Runs the tool.
    async fn invoke(&self, input: &ToolInput) -> Result<ToolOutput, ToolError>;

    /// Reverts a prior invocation identified by its undo token.
    async fn undo(&self, _token: &str) -> Result<(), ToolError> {
        Err(ToolError::UndoFailed {
            name: self.definition().name.clone(),
            reason: "tool does not support undo".to_string(),
        })
    }
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition().name)
            .finish()
    }
}
