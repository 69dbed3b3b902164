//! Error taxonomy for pipeline validation, execution, and the bundled
//! interceptor/tool extensions.
//!
//! Every structured error exposes a stable string code (see [`codes`]) and
//! can render a [`ContractErrorInfo`] record carrying a summary and a fix
//! hint for diagnostics surfaces.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Stable error codes surfaced in events and diagnostics.
pub mod codes {
    /// A pipeline was built with zero stages.
    pub const EMPTY_PIPELINE: &str = "EMPTY_PIPELINE";
    /// A stage references a dependency that is not part of the pipeline.
    pub const MISSING_DEPENDENCY: &str = "MISSING_DEPENDENCY";
    /// The dependency graph contains a cycle.
    pub const CYCLE_DETECTED: &str = "CYCLE_DETECTED";
    /// A stage body failed and the failure propagated.
    pub const STAGE_EXECUTION_FAILED: &str = "STAGE_EXECUTION_FAILED";
    /// Two distinct stages wrote the same context key.
    pub const CONTRACT_CONFLICT: &str = "CONTRACT_CONFLICT";
    /// The scheduler ran out of runnable stages before finishing.
    pub const DEADLOCK: &str = "DEADLOCK";
    /// A stage exceeded its execution deadline.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// A circuit breaker refused execution.
    pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";
    /// A child run attempted to mutate its parent's frozen data.
    pub const IMMUTABLE_VIEW_WRITE: &str = "IMMUTABLE_VIEW_WRITE";
    /// A pipeline name was not found in the registry.
    pub const PIPELINE_NOT_FOUND: &str = "PIPELINE_NOT_FOUND";
    /// A bearer token failed validation.
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    /// A bearer token is past its expiry.
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
    /// A token validated but lacks required claims.
    pub const MISSING_CLAIMS: &str = "MISSING_CLAIMS";
    /// A caller touched a resource belonging to another organization.
    pub const CROSS_TENANT_ACCESS: &str = "CROSS_TENANT_ACCESS";
}

/// Structured diagnostic record attached to errors and wide events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractErrorInfo {
    /// Stable error code.
    pub code: String,
    /// One-line human readable summary.
    pub summary: String,
    /// Suggested remediation, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Link to longer-form documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    /// Free-form contextual key/value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates an info record with a code and summary.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            doc_url: None,
            context: HashMap::new(),
        }
    }

    /// Attaches a remediation hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Attaches a documentation URL.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Renders the record as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Raised by `Pipeline::build` when the declared graph is not executable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineValidationError {
    /// The builder holds no stages.
    #[error("pipeline has no stages")]
    EmptyPipeline,

    /// A declared dependency does not name a stage in the pipeline.
    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    MissingDependency {
        /// The stage declaring the dependency.
        stage: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    CycleDetected {
        /// The full cycle, first node repeated at the end.
        path: Vec<String>,
    },
}

impl PipelineValidationError {
    /// The stable code for this validation failure.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPipeline => codes::EMPTY_PIPELINE,
            Self::MissingDependency { .. } => codes::MISSING_DEPENDENCY,
            Self::CycleDetected { .. } => codes::CYCLE_DETECTED,
        }
    }

    /// The offending cycle, if this is a cycle error.
    #[must_use]
    pub fn cycle_path(&self) -> Option<&[String]> {
        match self {
            Self::CycleDetected { path } => Some(path),
            _ => None,
        }
    }

    /// Builds the diagnostic record for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let info = ContractErrorInfo::new(self.code(), self.to_string());
        match self {
            Self::EmptyPipeline => {
                info.with_fix_hint("Add at least one stage before calling build().")
            }
            Self::MissingDependency { stage, dependency } => info
                .with_fix_hint("Add the referenced stage to the pipeline or fix the typo.")
                .with_context_entry("stage", stage.clone())
                .with_context_entry("dependency", dependency.clone()),
            Self::CycleDetected { path } => info
                .with_fix_hint("Remove one dependency edge along the reported path.")
                .with_context_entry("cycle", path.join(" -> ")),
        }
    }
}

/// Raised when a second distinct stage writes an already-claimed key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("key '{key}' already written by stage '{existing_writer}', rejected write from '{new_writer}'")]
pub struct DataConflictError {
    /// The contested key.
    pub key: String,
    /// The stage that owns the key.
    pub existing_writer: String,
    /// The stage whose write was rejected.
    pub new_writer: String,
}

impl DataConflictError {
    /// Creates a conflict error naming both writers.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        existing_writer: impl Into<String>,
        new_writer: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            existing_writer: existing_writer.into(),
            new_writer: new_writer.into(),
        }
    }

    /// Builds the diagnostic record for this conflict.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        ContractErrorInfo::new(codes::CONTRACT_CONFLICT, self.to_string())
            .with_fix_hint("Give each stage its own output key, or route the value through a dedicated merge stage.")
            .with_context_entry("key", self.key.clone())
            .with_context_entry("existing_writer", self.existing_writer.clone())
            .with_context_entry("new_writer", self.new_writer.clone())
    }
}

/// Raised when a child run attempts to mutate its parent's frozen data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parent data is frozen; cannot write key '{key}' from a child run")]
pub struct ImmutableViewError {
    /// The key the child tried to write.
    pub key: String,
}

impl ImmutableViewError {
    /// Creates an immutable-view violation for a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Authentication and tenancy failures raised by the bundled interceptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The presented token could not be validated.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// Why validation failed.
        reason: String,
    },

    /// The token is past its expiry instant.
    #[error("token expired at {expired_at}")]
    TokenExpired {
        /// Expiry timestamp in ISO-8601.
        expired_at: String,
    },

    /// The token validated but lacks a claim the caller needs.
    #[error("token is missing required claim '{claim}'")]
    MissingClaims {
        /// The absent claim name.
        claim: String,
    },

    /// The caller's organization does not match the resource's.
    #[error("cross-tenant access: caller org {caller_org} does not own resource org {resource_org}")]
    CrossTenantAccess {
        /// The caller's organization id.
        caller_org: String,
        /// The organization owning the resource.
        resource_org: String,
    },
}

impl AuthError {
    /// The stable code for this auth failure.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken { .. } => codes::INVALID_TOKEN,
            Self::TokenExpired { .. } => codes::TOKEN_EXPIRED,
            Self::MissingClaims { .. } => codes::MISSING_CLAIMS,
            Self::CrossTenantAccess { .. } => codes::CROSS_TENANT_ACCESS,
        }
    }
}

/// Failures raised by the optional tool-execution helper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// The tool name is not registered.
    #[error("tool not found: {name}")]
    NotFound {
        /// The requested tool name.
        name: String,
    },

    /// Invocation was refused by policy.
    #[error("tool '{name}' denied: {reason}")]
    Denied {
        /// The tool name.
        name: String,
        /// Why the invocation was refused.
        reason: String,
    },

    /// A human approver rejected the invocation.
    #[error("approval denied for tool '{name}'")]
    ApprovalDenied {
        /// The tool name.
        name: String,
    },

    /// No approval decision arrived within the deadline.
    #[error("approval for tool '{name}' timed out after {timeout_ms}ms")]
    ApprovalTimeout {
        /// The tool name.
        name: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// Reverting a prior invocation failed.
    #[error("undo failed for tool '{name}': {reason}")]
    UndoFailed {
        /// The tool name.
        name: String,
        /// Why the undo failed.
        reason: String,
    },

    /// The tool body itself failed.
    #[error("tool '{name}' failed: {reason}")]
    ExecutionFailed {
        /// The tool name.
        name: String,
        /// The failure description.
        reason: String,
    },
}

impl ToolError {
    /// The stable code for this tool failure.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "TOOL_NOT_FOUND",
            Self::Denied { .. } => "TOOL_DENIED",
            Self::ApprovalDenied { .. } => "TOOL_APPROVAL_DENIED",
            Self::ApprovalTimeout { .. } => "TOOL_APPROVAL_TIMEOUT",
            Self::UndoFailed { .. } => "TOOL_UNDO_FAILED",
            Self::ExecutionFailed { .. } => "TOOL_EXECUTION_FAILED",
        }
    }
}

/// The umbrella error type for all engine operations.
#[derive(Debug, Error)]
pub enum StageflowError {
    /// Structural validation failed at build time.
    #[error(transparent)]
    Validation(#[from] PipelineValidationError),

    /// A context key was claimed by two distinct writers.
    #[error(transparent)]
    DataConflict(#[from] DataConflictError),

    /// A stage failed at run time and the failure propagated.
    #[error("stage '{stage}' failed: {original}")]
    StageExecution {
        /// The failing stage.
        stage: String,
        /// The originating error description.
        original: String,
    },

    /// The scheduler stalled with unfinished stages. Unreachable for a
    /// validated graph; indicates an invariant violation.
    #[error("deadlocked stage graph; remaining stages: {pending:?}")]
    Deadlock {
        /// Names of the stages that never became ready.
        pending: Vec<String>,
    },

    /// A child run tried to mutate frozen parent data.
    #[error(transparent)]
    ImmutableView(#[from] ImmutableViewError),

    /// A registry lookup missed.
    #[error("pipeline '{0}' is not registered")]
    PipelineNotFound(String),

    /// A registry name is already bound to a different graph.
    #[error("pipeline '{0}' is already registered to a different graph")]
    PipelineConflict(String),

    /// Authentication or tenancy enforcement failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The tool helper failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StageflowError {
    /// The stable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::DataConflict(_) => codes::CONTRACT_CONFLICT,
            Self::StageExecution { .. } => codes::STAGE_EXECUTION_FAILED,
            Self::Deadlock { .. } => codes::DEADLOCK,
            Self::ImmutableView(_) => codes::IMMUTABLE_VIEW_WRITE,
            Self::PipelineNotFound(_) => codes::PIPELINE_NOT_FOUND,
            Self::PipelineConflict(_) => "PIPELINE_CONFLICT",
            Self::Auth(err) => err.code(),
            Self::Tool(err) => err.code(),
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Builds the diagnostic record for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::Validation(err) => err.error_info(),
            Self::DataConflict(err) => err.error_info(),
            Self::StageExecution { stage, .. } => {
                ContractErrorInfo::new(self.code(), self.to_string())
                    .with_fix_hint("Inspect the stage error and its on_error interceptors.")
                    .with_context_entry("stage", stage.clone())
            }
            Self::Deadlock { pending } => ContractErrorInfo::new(self.code(), self.to_string())
                .with_context_entry("pending", pending.join(", ")),
            _ => ContractErrorInfo::new(self.code(), self.to_string()),
        }
    }
}

impl From<serde_json::Error> for StageflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
