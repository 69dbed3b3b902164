//! Stage categorization and execution outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of work a stage performs.
///
/// Kinds are advisory metadata for observability and registries; they do
/// not influence scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Changes the form of its input (STT, TTS, LLM).
    Transform,
    /// Adds context (profile, memory, retrieval).
    Enrich,
    /// Selects a path (router, dispatcher).
    Route,
    /// Validates or blocks (guardrails, policy).
    Guard,
    /// Performs side effects (persist, notify).
    #[default]
    Work,
    /// A main interactor driving the conversation.
    Agent,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Transform => "transform",
            Self::Enrich => "enrich",
            Self::Route => "route",
            Self::Guard => "guard",
            Self::Work => "work",
            Self::Agent => "agent",
        };
        f.write_str(text)
    }
}

/// Terminal outcome of a stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage completed and its data is usable downstream.
    Ok,
    /// The stage declared itself inapplicable for this run.
    Skip,
    /// The stage requested graceful pipeline termination.
    Cancel,
    /// The stage failed.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::Skip => "skip",
            Self::Cancel => "cancel",
            Self::Fail => "fail",
        };
        f.write_str(text)
    }
}

impl StageStatus {
    /// True for outcomes that do not poison the run (Ok, Skip).
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }

    /// True for outcomes that terminate the run (Fail, Cancel).
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_serde() {
        for kind in [
            StageKind::Transform,
            StageKind::Enrich,
            StageKind::Route,
            StageKind::Guard,
            StageKind::Work,
            StageKind::Agent,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn status_classification() {
        assert!(StageStatus::Ok.is_success());
        assert!(StageStatus::Skip.is_success());
        assert!(StageStatus::Fail.is_failure());
        assert!(StageStatus::Cancel.is_failure());
        assert!(!StageStatus::Ok.is_failure());
    }

    #[test]
    fn status_round_trips_through_serde() {
        let status: StageStatus = serde_json::from_str("\"cancel\"").unwrap();
        assert_eq!(status, StageStatus::Cancel);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"cancel\"");
    }
}
