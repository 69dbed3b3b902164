//! Event emission infrastructure.
//!
//! The engine reports its lifecycle through an [`EventSink`]. The sink is
//! normally carried explicitly on the run context; the ambient process-wide
//! sink here is a convenience fallback for callers that do not thread one
//! through.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

static AMBIENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Installs the ambient event sink used by contexts created without an
/// explicit sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *AMBIENT_SINK.write() = Some(sink);
}

/// Removes the ambient event sink.
pub fn clear_event_sink() {
    *AMBIENT_SINK.write() = None;
}

/// The ambient sink, or a [`NoOpEventSink`] when none is installed.
#[must_use]
pub fn get_event_sink() -> Arc<dyn EventSink> {
    AMBIENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}
