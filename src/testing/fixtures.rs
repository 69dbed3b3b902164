//! Context fixtures for tests.

use crate::context::{ContextSnapshot, PipelineContext};
use crate::events::CollectingEventSink;
use std::sync::Arc;

/// A snapshot carrying only input text.
#[must_use]
pub fn snapshot_with_text(text: &str) -> ContextSnapshot {
    ContextSnapshot::new().with_input_text(text)
}

/// A run context over the given snapshot.
#[must_use]
pub fn context_for(snapshot: ContextSnapshot) -> Arc<PipelineContext> {
    Arc::new(PipelineContext::from_snapshot(snapshot))
}

/// A run context wired to a collecting sink, returned alongside the sink
/// for event-order assertions.
#[must_use]
pub fn collecting_context(
    snapshot: ContextSnapshot,
) -> (Arc<PipelineContext>, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let ctx = Arc::new(PipelineContext::from_snapshot(snapshot).with_event_sink(sink.clone()));
    (ctx, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_build() {
        let snapshot = snapshot_with_text("hi");
        assert_eq!(snapshot.input_text.as_deref(), Some("hi"));

        let (ctx, sink) = collecting_context(snapshot);
        ctx.try_emit_event("probe", serde_json::json!({}));
        assert_eq!(sink.position_of("probe"), Some(0));
    }
}
