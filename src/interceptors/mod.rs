//! Priority-ordered middleware around stage execution.
//!
//! Interceptors see three hook points: `before` (may short-circuit),
//! `after` (may annotate the output), and `on_error` (may retry or
//! replace). A fourth, `deadline`, lets an interceptor bound the stage
//! body's execution time.

mod chain;
mod circuit_breaker;
mod hardening;
mod logging;
mod retry;
mod timeout;

pub use chain::InterceptorChain;
pub use circuit_breaker::{BreakerConfig, CircuitBreakerInterceptor};
pub use hardening::ContextSizeInterceptor;
pub use logging::{LoggingInterceptor, MetricsInterceptor, StageCounters};
pub use retry::{RetryConfig, RetryInterceptor};
pub use timeout::TimeoutInterceptor;

use crate::context::{RunIdentity, StageContext};
use crate::core::{PipelineTimer, StageKind, StageOutput};
use async_trait::async_trait;
use std::time::Duration;

/// Snapshot metadata key holding a per-stage provider map
/// (`stage name -> provider label`).
pub const PROVIDERS_KEY: &str = "providers";

/// Snapshot metadata key holding a run-wide provider label, used when no
/// per-stage entry exists.
pub const PROVIDER_KEY: &str = "provider";

/// Decision returned by a `before` hook.
#[derive(Debug, Clone)]
pub enum BeforeAction {
    /// Proceed to the next interceptor, then the stage body.
    Continue,
    /// Short-circuit with a synthetic skip.
    Skip(String),
    /// Short-circuit with a synthetic failure.
    Fail(String),
    /// Short-circuit with a caller-provided output.
    Replace(StageOutput),
}

/// Decision returned by an `on_error` hook.
#[derive(Debug, Clone)]
pub enum ErrorAction {
    /// Let the failure stand.
    Propagate,
    /// Re-run the stage body after a delay. Upstream outputs and run
    /// identity are unchanged; the pipeline timer is not reset.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
    },
    /// Swallow the failure and use this output instead.
    Replace(StageOutput),
}

/// The read view interceptors get of the executing stage.
pub struct InterceptorContext<'a> {
    ctx: &'a StageContext,
}

impl<'a> InterceptorContext<'a> {
    /// Wraps a stage context.
    #[must_use]
    pub fn new(ctx: &'a StageContext) -> Self {
        Self { ctx }
    }

    /// The executing stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        self.ctx.stage_name()
    }

    /// The executing stage's kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.ctx.kind()
    }

    /// The run's correlation identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.ctx.snapshot().identity
    }

    /// The immutable run snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &crate::context::ContextSnapshot {
        self.ctx.snapshot()
    }

    /// The shared run timer.
    #[must_use]
    pub fn timer(&self) -> &PipelineTimer {
        self.ctx.timer()
    }

    /// The provider label the run declares for this stage, if any.
    ///
    /// Looked up in snapshot metadata: the [`PROVIDERS_KEY`] map entry for
    /// this stage wins, falling back to the run-wide [`PROVIDER_KEY`]
    /// value. The engine never interprets the label; interceptors that
    /// track per-provider state (the circuit breaker) use it as a key
    /// dimension.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        let metadata = &self.ctx.snapshot().metadata;
        metadata
            .get(PROVIDERS_KEY)
            .and_then(|map| map.get(self.stage_name()))
            .or_else(|| metadata.get(PROVIDER_KEY))
            .and_then(|v| v.as_str())
    }

    /// True once run cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }

    /// Emits an observation event through the run's sink.
    pub fn try_emit(&self, event_type: &str, data: serde_json::Value) {
        self.ctx.try_emit_event(event_type, data);
    }
}

/// Middleware wrapping stage execution.
///
/// `before` hooks run in ascending priority order, `after` hooks in
/// reverse; ties break by registration order. `after` may annotate events
/// and artifacts but must not rewrite the output's `data`.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Identifier used in logs and events.
    fn name(&self) -> &str;

    /// Ordering weight; lower runs earlier.
    fn priority(&self) -> i32 {
        0
    }

    /// Runs before the stage body. Returning anything but
    /// [`BeforeAction::Continue`] short-circuits the stage.
    async fn before(&self, _ictx: &InterceptorContext<'_>) -> BeforeAction {
        BeforeAction::Continue
    }

    /// Runs after the stage body with the produced output.
    async fn after(&self, _ictx: &InterceptorContext<'_>, output: StageOutput) -> StageOutput {
        output
    }

    /// Consulted when the stage body failed. `attempt` counts prior
    /// executions of the body, starting at 0.
    async fn on_error(
        &self,
        _ictx: &InterceptorContext<'_>,
        _error: &str,
        _attempt: u32,
    ) -> ErrorAction {
        ErrorAction::Propagate
    }

    /// Optional bound on the stage body's execution time. The chain
    /// applies the minimum across interceptors.
    fn deadline(&self, _ictx: &InterceptorContext<'_>) -> Option<Duration> {
        None
    }
}
