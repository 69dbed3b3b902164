//! Event sink protocol and bundled implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

/// Receiver for pipeline lifecycle and custom events.
///
/// Sinks must be safe to call concurrently; the executor emits from many
/// stage tasks at once.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event and waits for the sink to accept it.
    async fn emit(&self, event_type: &str, data: serde_json::Value);

    /// Best-effort, non-blocking emission. Must never fail; sinks log and
    /// swallow their own errors.
    fn try_emit(&self, event_type: &str, data: serde_json::Value);
}

/// Discards every event. The default when nothing is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: serde_json::Value) {}

    fn try_emit(&self, _event_type: &str, _data: serde_json::Value) {}
}

/// Forwards events into the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink {
    /// Emit at DEBUG instead of INFO.
    pub verbose: bool,
}

impl LoggingEventSink {
    /// A sink logging at INFO.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink logging at DEBUG.
    #[must_use]
    pub fn debug() -> Self {
        Self { verbose: true }
    }

    fn log(&self, event_type: &str, data: &serde_json::Value) {
        if self.verbose {
            debug!(event_type, payload = %data, "pipeline event");
        } else {
            info!(event_type, payload = %data, "pipeline event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.log(event_type, &data);
    }

    fn try_emit(&self, event_type: &str, data: serde_json::Value) {
        self.log(event_type, &data);
    }
}

/// Buffers events in memory. Intended for tests and assertions.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, serde_json::Value)>>,
}

impl CollectingEventSink {
    /// An empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events captured so far, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Event types captured so far, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Events whose type starts with `prefix`.
    #[must_use]
    pub fn events_with_prefix(&self, prefix: &str) -> Vec<(String, serde_json::Value)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Position of the first event with the exact type, if any.
    #[must_use]
    pub fn position_of(&self, event_type: &str) -> Option<usize> {
        self.events.read().iter().position(|(t, _)| t == event_type)
    }

    /// Number of captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True when nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all captured events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push((event_type.to_string(), data));
    }
}
