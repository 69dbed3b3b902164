//! The unified return type for all stage executions.

use super::{StageArtifact, StageEvent, StageStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The result of executing one stage.
///
/// Every stage returns a `StageOutput` regardless of kind. The `status`
/// field drives scheduling; `data` is the payload handed to downstream
/// stages; `artifacts` and `events` are observational by-products.
///
/// Contract: `Fail` carries `error`, and `Skip`/`Cancel` carry `reason`.
/// The factory methods uphold this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// Terminal outcome of the execution.
    pub status: StageStatus,

    /// Payload for downstream stages. Must stay JSON-serializable.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,

    /// Artifacts produced while running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StageArtifact>,

    /// Events recorded while running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<StageEvent>,

    /// Contract version stamped by the typed-output wrapper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Failure description. Present when `status` is `Fail`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Why the stage skipped or the run was cancelled. Present when
    /// `status` is `Skip` or `Cancel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Default for StageOutput {
    fn default() -> Self {
        Self::ok_empty()
    }
}

impl StageOutput {
    fn base(status: StageStatus) -> Self {
        Self {
            status,
            data: HashMap::new(),
            artifacts: Vec::new(),
            events: Vec::new(),
            version: None,
            error: None,
            reason: None,
        }
    }

    /// A successful output carrying a data payload.
    #[must_use]
    pub fn ok(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data,
            ..Self::base(StageStatus::Ok)
        }
    }

    /// A successful output with no payload.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::base(StageStatus::Ok)
    }

    /// A successful output with a single key/value pair.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::ok(HashMap::from([(key.into(), value)]))
    }

    /// The stage declares itself inapplicable for this run.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::base(StageStatus::Skip)
        }
    }

    /// The stage requests graceful pipeline termination.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::base(StageStatus::Cancel)
        }
    }

    /// Graceful termination that still hands partial data to the caller.
    #[must_use]
    pub fn cancel_with_data(
        reason: impl Into<String>,
        data: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            reason: Some(reason.into()),
            data,
            ..Self::base(StageStatus::Cancel)
        }
    }

    /// A failed output.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(StageStatus::Fail)
        }
    }

    /// A failed output that preserves partial data for diagnostics.
    #[must_use]
    pub fn fail_with_data(
        error: impl Into<String>,
        data: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            data,
            ..Self::base(StageStatus::Fail)
        }
    }

    /// A failed output whose error message starts with a stable code,
    /// `"<code>: <detail>"`.
    #[must_use]
    pub fn fail_coded(code: &str, detail: impl Into<String>) -> Self {
        Self::fail(format!("{code}: {}", detail.into()))
    }

    /// Replaces the artifact list.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<StageArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Replaces the event list.
    #[must_use]
    pub fn with_events(mut self, events: Vec<StageEvent>) -> Self {
        self.events = events;
        self
    }

    /// Merges additional entries into the data payload.
    #[must_use]
    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data.extend(data);
        self
    }

    /// Stamps the contract version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Appends one recorded event.
    #[must_use]
    pub fn push_event(mut self, event: StageEvent) -> Self {
        self.events.push(event);
        self
    }

    /// True when the output does not poison the run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// True when the output terminates the run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Reads one value from the data payload.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// The leading `"<code>"` of a coded error message, when present.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(|e| e.split(':').next().unwrap_or(e).trim())
    }

    /// The mapping representation used by snapshots and event payloads.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_carries_data() {
        let output = StageOutput::ok_value("echo", serde_json::json!("Hello"));
        assert_eq!(output.status, StageStatus::Ok);
        assert!(output.is_success());
        assert_eq!(output.get("echo"), Some(&serde_json::json!("Hello")));
        assert!(output.error.is_none());
    }

    #[test]
    fn skip_and_cancel_carry_reason() {
        let skipped = StageOutput::skip("upstream_unavailable");
        assert_eq!(skipped.status, StageStatus::Skip);
        assert_eq!(skipped.reason.as_deref(), Some("upstream_unavailable"));

        let cancelled = StageOutput::cancel_with_data(
            "no speech detected",
            HashMap::from([("partial".to_string(), serde_json::json!(true))]),
        );
        assert_eq!(cancelled.status, StageStatus::Cancel);
        assert_eq!(cancelled.reason.as_deref(), Some("no speech detected"));
        assert_eq!(cancelled.get("partial"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn fail_carries_error() {
        let output = StageOutput::fail("provider unreachable");
        assert_eq!(output.status, StageStatus::Fail);
        assert!(output.is_failure());
        assert_eq!(output.error.as_deref(), Some("provider unreachable"));
    }

    #[test]
    fn coded_failures_expose_their_code() {
        let output = StageOutput::fail_coded("contract_conflict", "key 'x' already written");
        assert_eq!(output.error_code(), Some("contract_conflict"));

        let plain = StageOutput::fail("just broke");
        assert_eq!(plain.error_code(), Some("just broke"));
    }

    #[test]
    fn builders_compose() {
        let output = StageOutput::ok_empty()
            .with_data(HashMap::from([("k".to_string(), serde_json::json!(1))]))
            .with_version("v2")
            .push_event(StageEvent::new("progress"));
        assert_eq!(output.version.as_deref(), Some("v2"));
        assert_eq!(output.events.len(), 1);
        assert_eq!(output.get("k"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn output_round_trips_through_serde() {
        let output = StageOutput::ok_value("text", serde_json::json!("FEDCBA"))
            .with_version("v1")
            .with_artifacts(vec![StageArtifact::new(
                "transcript",
                serde_json::json!({"text": "FEDCBA"}),
            )]);
        let json = serde_json::to_string(&output).unwrap();
        let back: StageOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output, back);
    }

    #[test]
    fn to_dict_reflects_status() {
        let dict = StageOutput::fail("boom").to_dict();
        assert_eq!(dict.get("status"), Some(&serde_json::json!("fail")));
        assert_eq!(dict.get("error"), Some(&serde_json::json!("boom")));
    }
}
