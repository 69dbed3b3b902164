//! Wide events: one self-contained record per lifecycle transition.

use crate::context::PipelineContext;
use crate::core::StageStatus;
use crate::utils::{now, Timestamp};
use serde::Serialize;
use uuid::Uuid;

/// A single observability record carrying full correlating identity.
///
/// Every lifecycle transition the executor reports is one wide event; a
/// consumer never needs to join records to reconstruct what happened.
#[derive(Debug, Clone, Serialize)]
pub struct WideEvent {
    /// Unique id of this event.
    pub event_id: Uuid,
    /// Event type, e.g. `"stage.echo.completed"`.
    pub event_type: String,
    /// When the event was built.
    pub timestamp: Timestamp,
    /// The run the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_run_id: Option<Uuid>,
    /// The parent run, for subruns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<Uuid>,
    /// The stage the event concerns, for `stage.*` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Terminal status, for completion events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StageStatus>,
    /// Elapsed time on the shared run timer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Free-form payload.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl WideEvent {
    /// A wide event of the given type, stamped with identity from the run
    /// context.
    #[must_use]
    pub fn for_run(event_type: impl Into<String>, ctx: &PipelineContext) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: now(),
            pipeline_run_id: ctx.pipeline_run_id(),
            parent_run_id: ctx.lineage().and_then(|l| l.parent_run_id),
            stage: None,
            status: None,
            duration_ms: None,
            data: serde_json::Map::new(),
        }
    }

    /// Names the stage the event concerns.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Records a terminal status.
    #[must_use]
    pub fn with_status(mut self, status: StageStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Records elapsed run time.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Adds one payload entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Renders the event as a JSON payload.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Emits the event through the run's sink, without blocking.
    pub fn emit(self, ctx: &PipelineContext) {
        let event_type = self.event_type.clone();
        ctx.event_sink().try_emit(&event_type, self.to_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSnapshot, ForkOptions};
    use crate::events::CollectingEventSink;
    use std::sync::Arc;

    #[test]
    fn event_carries_run_identity() {
        let ctx = PipelineContext::from_snapshot(ContextSnapshot::new());
        let event = WideEvent::for_run("pipeline.started", &ctx)
            .with_data("stages", serde_json::json!(3));

        assert_eq!(event.pipeline_run_id, ctx.pipeline_run_id());
        assert!(event.parent_run_id.is_none());

        let value = event.to_value();
        assert_eq!(value["event_type"], "pipeline.started");
        assert_eq!(value["data"]["stages"], 3);
        assert!(value["event_id"].is_string());
    }

    #[test]
    fn subrun_events_carry_the_parent_id() {
        let parent = Arc::new(PipelineContext::from_snapshot(ContextSnapshot::new()));
        let child = parent.fork(ForkOptions::new("spawner"));

        let event = WideEvent::for_run("pipeline.started", &child);
        assert_eq!(event.parent_run_id, parent.pipeline_run_id());
        assert_eq!(event.pipeline_run_id, child.pipeline_run_id());
    }

    #[test]
    fn stage_fields_render() {
        let ctx = PipelineContext::from_snapshot(ContextSnapshot::new());
        let value = WideEvent::for_run("stage.echo.completed", &ctx)
            .with_stage("echo")
            .with_status(StageStatus::Ok)
            .with_duration_ms(12)
            .to_value();

        assert_eq!(value["stage"], "echo");
        assert_eq!(value["status"], "ok");
        assert_eq!(value["duration_ms"], 12);
    }

    #[test]
    fn emit_goes_through_the_sink() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = PipelineContext::from_snapshot(ContextSnapshot::new())
            .with_event_sink(sink.clone());

        WideEvent::for_run("pipeline.completed", &ctx).emit(&ctx);
        assert_eq!(sink.position_of("pipeline.completed"), Some(0));
    }
}
