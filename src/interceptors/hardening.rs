//! Development-mode hardening checks.

use super::{Interceptor, InterceptorContext};
use crate::core::StageOutput;
use tracing::warn;

/// Watches shared-bag growth and flags stages that exceed a byte budget.
///
/// Observation only: budget overruns emit a `context.size_exceeded` event
/// and a warning, they never alter the stage outcome.
#[derive(Debug, Clone)]
pub struct ContextSizeInterceptor {
    max_output_bytes: usize,
}

impl ContextSizeInterceptor {
    /// Flags stage outputs whose serialized data exceeds `max_output_bytes`.
    #[must_use]
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl Default for ContextSizeInterceptor {
    fn default() -> Self {
        // 256 KiB of serialized data per stage before warnings kick in.
        Self::new(256 * 1024)
    }
}

#[async_trait::async_trait]
impl Interceptor for ContextSizeInterceptor {
    fn name(&self) -> &str {
        "context_size"
    }

    fn priority(&self) -> i32 {
        -800
    }

    async fn after(&self, ictx: &InterceptorContext<'_>, output: StageOutput) -> StageOutput {
        let size = serde_json::to_vec(&output.data).map(|b| b.len()).unwrap_or(0);
        if size > self.max_output_bytes {
            warn!(
                stage = ictx.stage_name(),
                bytes = size,
                budget = self.max_output_bytes,
                "stage output exceeds context size budget"
            );
            ictx.try_emit(
                "context.size_exceeded",
                serde_json::json!({
                    "stage": ictx.stage_name(),
                    "bytes": size,
                    "budget": self.max_output_bytes,
                }),
            );
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSnapshot, PipelineContext, StageContext, StageInputs};
    use crate::core::StageKind;
    use crate::events::CollectingEventSink;
    use std::sync::Arc;

    fn ctx_with_sink() -> (StageContext, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = Arc::new(
            PipelineContext::from_snapshot(ContextSnapshot::new()).with_event_sink(sink.clone()),
        );
        (
            StageContext::new(pipeline, "big", StageKind::Work, StageInputs::default()),
            sink,
        )
    }

    #[tokio::test]
    async fn small_outputs_pass_silently() {
        let (ctx, sink) = ctx_with_sink();
        let interceptor = ContextSizeInterceptor::new(1024);

        let output = StageOutput::ok_value("k", serde_json::json!("small"));
        interceptor
            .after(&InterceptorContext::new(&ctx), output)
            .await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn oversized_outputs_emit_a_warning_event() {
        let (ctx, sink) = ctx_with_sink();
        let interceptor = ContextSizeInterceptor::new(16);

        let output =
            StageOutput::ok_value("blob", serde_json::json!("x".repeat(64)));
        let unchanged = interceptor
            .after(&InterceptorContext::new(&ctx), output.clone())
            .await;

        // The outcome is untouched; only the event records the overrun.
        assert_eq!(unchanged, output);
        assert_eq!(sink.position_of("context.size_exceeded"), Some(0));
    }
}
