//! Events recorded by a stage during execution.

use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single event recorded while a stage ran.
///
/// These travel with the [`StageOutput`](super::StageOutput); pipeline-level
/// lifecycle events go through the event sink instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Event type, e.g. `"progress"` or `"first_token"`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// When the event was recorded.
    pub timestamp: Timestamp,
}

impl StageEvent {
    /// Records an event with no payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: HashMap::new(),
            timestamp: now(),
        }
    }

    /// Records an event with a payload.
    #[must_use]
    pub fn with_data(
        event_type: impl Into<String>,
        data: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: now(),
        }
    }

    /// Adds one payload entry.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_builder_accumulates_data() {
        let event = StageEvent::new("progress")
            .add_data("pct", serde_json::json!(40))
            .add_data("detail", serde_json::json!("halfway"));
        assert_eq!(event.event_type, "progress");
        assert_eq!(event.data.len(), 2);
    }

    #[test]
    fn event_round_trips() {
        let event = StageEvent::with_data(
            "chunk",
            HashMap::from([("bytes".to_string(), serde_json::json!(512))]),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: StageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
