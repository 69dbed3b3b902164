//! Observation-only interceptors: structured logging and counters.

use super::{Interceptor, InterceptorContext};
use crate::core::{StageOutput, StageStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Logs stage boundaries through `tracing`. Never changes outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

#[async_trait::async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    fn priority(&self) -> i32 {
        -1000
    }

    async fn before(&self, ictx: &InterceptorContext<'_>) -> super::BeforeAction {
        debug!(
            stage = ictx.stage_name(),
            kind = %ictx.kind(),
            elapsed_ms = ictx.timer().elapsed_ms(),
            "stage starting"
        );
        super::BeforeAction::Continue
    }

    async fn after(&self, ictx: &InterceptorContext<'_>, output: StageOutput) -> StageOutput {
        match output.status {
            StageStatus::Fail => error!(
                stage = ictx.stage_name(),
                error = output.error.as_deref().unwrap_or(""),
                "stage failed"
            ),
            status => info!(
                stage = ictx.stage_name(),
                status = %status,
                elapsed_ms = ictx.timer().elapsed_ms(),
                "stage finished"
            ),
        }
        output
    }
}

/// Per-status counters for one run or process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageCounters {
    /// Stages that completed Ok.
    pub ok: u64,
    /// Stages that skipped.
    pub skipped: u64,
    /// Stages that failed.
    pub failed: u64,
    /// Stages that cancelled the run.
    pub cancelled: u64,
}

/// Counts terminal stage outcomes. Never changes them.
#[derive(Debug, Default)]
pub struct MetricsInterceptor {
    counters: Mutex<HashMap<String, StageCounters>>,
}

impl MetricsInterceptor {
    /// A fresh metrics interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The counters for one stage.
    #[must_use]
    pub fn counters_for(&self, stage: &str) -> StageCounters {
        self.counters.lock().get(stage).cloned().unwrap_or_default()
    }

    /// Counters summed across all stages.
    #[must_use]
    pub fn totals(&self) -> StageCounters {
        let counters = self.counters.lock();
        let mut totals = StageCounters::default();
        for c in counters.values() {
            totals.ok += c.ok;
            totals.skipped += c.skipped;
            totals.failed += c.failed;
            totals.cancelled += c.cancelled;
        }
        totals
    }
}

#[async_trait::async_trait]
impl Interceptor for MetricsInterceptor {
    fn name(&self) -> &str {
        "metrics"
    }

    fn priority(&self) -> i32 {
        -900
    }

    async fn after(&self, ictx: &InterceptorContext<'_>, output: StageOutput) -> StageOutput {
        let mut counters = self.counters.lock();
        let entry = counters.entry(ictx.stage_name().to_string()).or_default();
        match output.status {
            StageStatus::Ok => entry.ok += 1,
            StageStatus::Skip => entry.skipped += 1,
            StageStatus::Fail => entry.failed += 1,
            StageStatus::Cancel => entry.cancelled += 1,
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSnapshot, PipelineContext, StageContext, StageInputs};
    use crate::core::StageKind;
    use std::sync::Arc;

    fn stage_ctx(name: &str) -> StageContext {
        StageContext::new(
            Arc::new(PipelineContext::from_snapshot(ContextSnapshot::new())),
            name,
            StageKind::Work,
            StageInputs::default(),
        )
    }

    #[tokio::test]
    async fn logging_is_transparent() {
        let interceptor = LoggingInterceptor;
        let ctx = stage_ctx("echo");
        let ictx = InterceptorContext::new(&ctx);

        assert!(matches!(
            interceptor.before(&ictx).await,
            super::super::BeforeAction::Continue
        ));
        let output = StageOutput::ok_value("k", serde_json::json!(1));
        let after = interceptor.after(&ictx, output.clone()).await;
        assert_eq!(after, output);
    }

    #[tokio::test]
    async fn metrics_count_outcomes() {
        let metrics = MetricsInterceptor::new();
        let ctx = stage_ctx("worker");
        let ictx = InterceptorContext::new(&ctx);

        metrics.after(&ictx, StageOutput::ok_empty()).await;
        metrics.after(&ictx, StageOutput::ok_empty()).await;
        metrics.after(&ictx, StageOutput::fail("x")).await;
        metrics.after(&ictx, StageOutput::skip("n/a")).await;

        let counters = metrics.counters_for("worker");
        assert_eq!(counters.ok, 2);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.skipped, 1);
        assert_eq!(counters.cancelled, 0);
        assert_eq!(metrics.totals().ok, 2);
        assert_eq!(metrics.counters_for("absent"), StageCounters::default());
    }
}
