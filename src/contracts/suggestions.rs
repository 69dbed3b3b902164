//! Remediation registry keyed by stable error code.

use crate::errors::codes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Remediation guidance for one error code.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The code this suggestion applies to.
    pub code: String,
    /// Short title.
    pub title: String,
    /// What went wrong.
    pub summary: String,
    /// Ordered fix steps.
    pub fix_steps: Vec<String>,
    /// Longer-form documentation link.
    pub doc_url: Option<String>,
}

impl Suggestion {
    /// A suggestion for a code.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        fix_steps: Vec<String>,
    ) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            summary: summary.into(),
            fix_steps,
            doc_url: None,
        }
    }

    /// Attaches a documentation link.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }
}

fn steps(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

static REGISTRY: LazyLock<RwLock<HashMap<String, Suggestion>>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    let preload = [
        Suggestion::new(
            codes::EMPTY_PIPELINE,
            "Empty Pipeline",
            "build() was called on a pipeline with no stages.",
            steps(&["Declare at least one stage before building."]),
        ),
        Suggestion::new(
            codes::MISSING_DEPENDENCY,
            "Missing Stage Dependency",
            "A stage depends on a name that is not part of the pipeline.",
            steps(&[
                "Add the referenced stage to the pipeline",
                "Or remove the dependency if it is stale",
                "Check for typos in stage names",
            ]),
        ),
        Suggestion::new(
            codes::CYCLE_DETECTED,
            "Dependency Cycle",
            "Stages depend on each other in a loop; no execution order exists.",
            steps(&[
                "Follow the reported cycle path",
                "Remove one dependency edge to break the loop",
            ]),
        ),
        Suggestion::new(
            codes::CONTRACT_CONFLICT,
            "Conflicting Output Key",
            "Two stages wrote the same key into the shared context.",
            steps(&[
                "Namespace each stage's output keys",
                "Or merge the values in a dedicated downstream stage",
            ]),
        ),
        Suggestion::new(
            codes::STAGE_EXECUTION_FAILED,
            "Stage Failed",
            "A stage returned a failure and no interceptor recovered it.",
            steps(&[
                "Inspect the stage error in the pipeline.failed event",
                "Consider a retry interceptor for transient errors",
            ]),
        ),
        Suggestion::new(
            codes::DEADLOCK,
            "Scheduler Deadlock",
            "No stage was runnable while some were unfinished. For a validated graph this indicates an engine invariant violation.",
            steps(&["Report this together with the pipeline declaration."]),
        ),
        Suggestion::new(
            codes::TIMEOUT,
            "Stage Deadline Exceeded",
            "The stage body ran longer than its configured deadline.",
            steps(&[
                "Raise the per-stage deadline",
                "Or make the stage body stream/chunk its work",
            ]),
        ),
        Suggestion::new(
            codes::CIRCUIT_OPEN,
            "Circuit Open",
            "The stage was rejected because its recent failure rate tripped the breaker.",
            steps(&[
                "Wait for the cooldown to elapse",
                "Investigate the upstream provider failures",
            ]),
        ),
        Suggestion::new(
            codes::IMMUTABLE_VIEW_WRITE,
            "Write To Frozen Parent Data",
            "A child run attempted to mutate its parent's data view.",
            steps(&["Write into the child's own context instead."]),
        ),
        Suggestion::new(
            codes::PIPELINE_NOT_FOUND,
            "Unknown Pipeline",
            "The requested pipeline name is not registered.",
            steps(&["Register the pipeline before looking it up."]),
        ),
        Suggestion::new(
            codes::CROSS_TENANT_ACCESS,
            "Cross-Tenant Access",
            "The caller's organization does not own the touched resource.",
            steps(&["Verify the resource id", "Check the caller's token claims"]),
        ),
    ];

    for suggestion in preload {
        map.insert(suggestion.code.clone(), suggestion);
    }
    RwLock::new(map)
});

/// Looks up the remediation for an error code.
#[must_use]
pub fn suggestion_for(code: &str) -> Option<Suggestion> {
    REGISTRY.read().get(code).cloned()
}

/// Registers or replaces the remediation for a code.
pub fn register_suggestion(suggestion: Suggestion) {
    REGISTRY
        .write()
        .insert(suggestion.code.clone(), suggestion);
}
