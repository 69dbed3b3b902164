//! Structured artifacts captured alongside a stage's data.

use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};

/// An artifact produced during stage execution.
///
/// Artifacts are collected independently of the output `data` map and are
/// never consulted by the scheduler; they exist for callers that want
/// structured by-products (audio, transcripts, reports).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    /// Artifact category, e.g. `"audio"` or `"transcript"`.
    #[serde(rename = "type")]
    pub artifact_type: String,

    /// The artifact content.
    pub payload: serde_json::Value,

    /// When the artifact was captured.
    pub created_at: Timestamp,
}

impl StageArtifact {
    /// Captures an artifact now.
    #[must_use]
    pub fn new(artifact_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            artifact_type: artifact_type.into(),
            payload,
            created_at: now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_serializes_type_field() {
        let artifact = StageArtifact::new("transcript", serde_json::json!({"text": "hi"}));
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["type"], "transcript");
        assert_eq!(value["payload"]["text"], "hi");
    }

    #[test]
    fn artifact_round_trips() {
        let artifact = StageArtifact::new("report", serde_json::json!([1, 2, 3]));
        let json = serde_json::to_string(&artifact).unwrap();
        let back: StageArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(artifact, back);
    }
}
