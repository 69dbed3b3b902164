//! Mock stages with predictable behavior.

use crate::context::StageContext;
use crate::core::{StageKind, StageOutput};
use crate::stages::Stage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn upstream_text(ctx: &StageContext) -> String {
    ctx.inputs()
        .get("text")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .or_else(|| ctx.snapshot().input_text.clone())
        .unwrap_or_default()
}

/// Echoes the snapshot's input text as `data["echo"]`.
#[derive(Debug, Clone)]
pub struct EchoStage {
    name: String,
}

impl EchoStage {
    /// An echo stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for EchoStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text = ctx.snapshot().input_text.clone().unwrap_or_default();
        StageOutput::ok_value("echo", serde_json::json!(text))
    }
}

/// Uppercases upstream `text` (falling back to the snapshot input).
#[derive(Debug, Clone)]
pub struct UppercaseStage {
    name: String,
}

impl UppercaseStage {
    /// An uppercasing stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for UppercaseStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text = upstream_text(ctx).to_uppercase();
        StageOutput::ok_value("text", serde_json::json!(text))
    }
}

/// Reverses upstream `text`.
#[derive(Debug, Clone)]
pub struct ReverseStage {
    name: String,
}

impl ReverseStage {
    /// A reversing stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for ReverseStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text: String = upstream_text(ctx).chars().rev().collect();
        StageOutput::ok_value("text", serde_json::json!(text))
    }
}

/// Appends a summary marker to upstream `text`.
#[derive(Debug, Clone)]
pub struct SummarizeStage {
    name: String,
}

impl SummarizeStage {
    /// A summarizing stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for SummarizeStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let text = format!("{} (summary)", upstream_text(ctx));
        StageOutput::ok_value("text", serde_json::json!(text))
    }
}

/// Sleeps for a fixed duration, then succeeds with the given data.
#[derive(Debug, Clone)]
pub struct SleepStage {
    name: String,
    duration: Duration,
    data: Option<(String, serde_json::Value)>,
}

impl SleepStage {
    /// A stage sleeping for `duration`.
    #[must_use]
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            data: None,
        }
    }

    /// Emits one key/value pair on success.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data = Some((key.into(), value));
        self
    }
}

#[async_trait]
impl Stage for SleepStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        tokio::time::sleep(self.duration).await;
        match &self.data {
            Some((key, value)) => StageOutput::ok_value(key.clone(), value.clone()),
            None => StageOutput::ok_empty(),
        }
    }
}

/// Fails a configurable number of times before succeeding. With
/// `fail_times == u32::MAX` it never recovers.
#[derive(Debug)]
pub struct FlakyStage {
    name: String,
    error: String,
    fail_times: u32,
    attempts: AtomicU32,
}

impl FlakyStage {
    /// A stage failing `fail_times` times with `error`, then succeeding.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>, fail_times: u32) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            fail_times,
            attempts: AtomicU32::new(0),
        }
    }

    /// A stage that always fails.
    #[must_use]
    pub fn always(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(name, error, u32::MAX)
    }

    /// How many times the body ran.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FlakyStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            StageOutput::fail(self.error.clone())
        } else {
            StageOutput::ok_value("recovered_after", serde_json::json!(attempt))
        }
    }
}

/// Requests graceful pipeline cancellation.
#[derive(Debug, Clone)]
pub struct CancellingStage {
    name: String,
    reason: String,
}

impl CancellingStage {
    /// A stage cancelling the run with `reason`.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Stage for CancellingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::cancel(self.reason.clone())
    }
}

/// Appends its name to a shared log when executed.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingStage {
    /// A recording stage writing into `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        self.log.lock().push(self.name.clone());
        StageOutput::ok_empty()
    }
}

/// Succeeds with one fixed key/value pair. Useful for conflict scenarios.
#[derive(Debug, Clone)]
pub struct KeyWriterStage {
    name: String,
    key: String,
    value: serde_json::Value,
    delay: Duration,
}

impl KeyWriterStage {
    /// A stage writing `key = value`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            value,
            delay: Duration::ZERO,
        }
    }

    /// Delays completion, to order writers deterministically.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Stage for KeyWriterStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        StageOutput::ok_value(self.key.clone(), self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context_for;
    use crate::context::{StageInputs, StageContext};
    use crate::core::StageStatus;

    fn ctx_with_text(text: &str) -> StageContext {
        let pipeline = context_for(
            crate::context::ContextSnapshot::new().with_input_text(text),
        );
        StageContext::new(pipeline, "test", StageKind::Work, StageInputs::default())
    }

    #[tokio::test]
    async fn echo_reflects_input_text() {
        let output = EchoStage::new("echo").execute(&ctx_with_text("Hello")).await;
        assert_eq!(output.get("echo"), Some(&serde_json::json!("Hello")));
    }

    #[tokio::test]
    async fn text_transforms_compose() {
        let upper = UppercaseStage::new("upper")
            .execute(&ctx_with_text("abcDEF"))
            .await;
        assert_eq!(upper.get("text"), Some(&serde_json::json!("ABCDEF")));

        let reversed = ReverseStage::new("reverse")
            .execute(&ctx_with_text("ABCDEF"))
            .await;
        assert_eq!(reversed.get("text"), Some(&serde_json::json!("FEDCBA")));
    }

    #[tokio::test]
    async fn flaky_recovers_after_failures() {
        let stage = FlakyStage::new("flaky", "transient", 2);
        let ctx = ctx_with_text("");

        assert_eq!(stage.execute(&ctx).await.status, StageStatus::Fail);
        assert_eq!(stage.execute(&ctx).await.status, StageStatus::Fail);
        assert_eq!(stage.execute(&ctx).await.status, StageStatus::Ok);
        assert_eq!(stage.attempts(), 3);
    }

    #[tokio::test]
    async fn cancelling_stage_carries_reason() {
        let output = CancellingStage::new("gate", "no speech detected")
            .execute(&ctx_with_text(""))
            .await;
        assert_eq!(output.status, StageStatus::Cancel);
        assert_eq!(output.reason.as_deref(), Some("no speech detected"));
    }
}
