//! Sliding-window circuit breaker per `(stage, provider)` pair.

use super::{BeforeAction, Interceptor, InterceptorContext};
use crate::core::{StageOutput, StageStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Tuning for [`CircuitBreakerInterceptor`].
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within the window that open the circuit.
    pub failure_threshold: usize,
    /// Width of the sliding failure window.
    pub window: Duration,
    /// How long an open circuit stays open before a probe is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

// Stage name plus provider label; unlabeled stages use "".
type BreakerKey = (String, String);

#[derive(Debug)]
enum BreakerState {
    Closed { failures: VecDeque<Instant> },
    Open { since: Instant },
    HalfOpen,
}

/// Fails a stage fast while its recent failure rate is too high.
///
/// Circuits are independent per `(stage, provider)` pair, so a stage that
/// can reach several providers keeps a healthy circuit for each provider
/// that is not failing. The provider label comes from
/// [`InterceptorContext::provider`]; stages with no declared provider
/// share one unlabeled circuit. Open circuits reject with the
/// `circuit_open` code; after the cooldown a single probe execution is
/// allowed, and its outcome closes or re-opens the circuit.
pub struct CircuitBreakerInterceptor {
    config: BreakerConfig,
    states: Mutex<HashMap<BreakerKey, BreakerState>>,
}

fn key_for(ictx: &InterceptorContext<'_>) -> BreakerKey {
    (
        ictx.stage_name().to_string(),
        ictx.provider().unwrap_or_default().to_string(),
    )
}

impl CircuitBreakerInterceptor {
    /// A breaker with the given tuning.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// True when the unlabeled circuit for `stage` is open.
    #[must_use]
    pub fn is_open(&self, stage: &str) -> bool {
        self.is_open_for(stage, "")
    }

    /// True when the circuit for `(stage, provider)` is open.
    #[must_use]
    pub fn is_open_for(&self, stage: &str, provider: &str) -> bool {
        matches!(
            self.states
                .lock()
                .get(&(stage.to_string(), provider.to_string())),
            Some(BreakerState::Open { .. })
        )
    }

    fn record_failure(&self, key: BreakerKey) {
        let mut states = self.states.lock();
        let state = states.entry(key).or_insert_with(|| BreakerState::Closed {
            failures: VecDeque::new(),
        });

        match state {
            BreakerState::Closed { failures } => {
                let now = Instant::now();
                failures.push_back(now);
                while let Some(first) = failures.front() {
                    if now.duration_since(*first) > self.config.window {
                        failures.pop_front();
                    } else {
                        break;
                    }
                }
                if failures.len() >= self.config.failure_threshold {
                    *state = BreakerState::Open { since: now };
                }
            }
            // A failed probe re-opens the circuit.
            BreakerState::HalfOpen => *state = BreakerState::Open { since: Instant::now() },
            BreakerState::Open { .. } => {}
        }
    }

    fn record_success(&self, key: BreakerKey) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(&key) {
            *state = BreakerState::Closed {
                failures: VecDeque::new(),
            };
        }
    }
}

impl Default for CircuitBreakerInterceptor {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[async_trait::async_trait]
impl Interceptor for CircuitBreakerInterceptor {
    fn name(&self) -> &str {
        "circuit_breaker"
    }

    fn priority(&self) -> i32 {
        -50
    }

    async fn before(&self, ictx: &InterceptorContext<'_>) -> BeforeAction {
        let key = key_for(ictx);
        let mut states = self.states.lock();

        if let Some(state) = states.get_mut(&key) {
            if let BreakerState::Open { since } = state {
                if since.elapsed() < self.config.cooldown {
                    drop(states);
                    let (stage, provider) = key;
                    ictx.try_emit(
                        "stage.circuit_rejected",
                        serde_json::json!({
                            "stage": &stage,
                            "provider": &provider,
                        }),
                    );
                    let error = if provider.is_empty() {
                        format!("circuit_open: stage '{stage}' is failing too often")
                    } else {
                        format!(
                            "circuit_open: stage '{stage}' via provider '{provider}' is failing too often"
                        )
                    };
                    return BeforeAction::Fail(error);
                }
                *state = BreakerState::HalfOpen;
            }
        }
        BeforeAction::Continue
    }

    async fn after(&self, ictx: &InterceptorContext<'_>, output: StageOutput) -> StageOutput {
        match output.status {
            StageStatus::Fail => self.record_failure(key_for(ictx)),
            StageStatus::Ok => self.record_success(key_for(ictx)),
            _ => {}
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::super::PROVIDERS_KEY;
    use super::*;
    use crate::context::{ContextSnapshot, PipelineContext, StageContext, StageInputs};
    use crate::core::StageKind;
    use std::sync::Arc;

    fn stage_ctx(name: &str) -> StageContext {
        stage_ctx_over(name, ContextSnapshot::new())
    }

    fn stage_ctx_over(name: &str, snapshot: ContextSnapshot) -> StageContext {
        StageContext::new(
            Arc::new(PipelineContext::from_snapshot(snapshot)),
            name,
            StageKind::Work,
            StageInputs::default(),
        )
    }

    fn provider_ctx(name: &str, provider: &str) -> StageContext {
        let mut providers = serde_json::Map::new();
        providers.insert(name.to_string(), serde_json::json!(provider));
        stage_ctx_over(
            name,
            ContextSnapshot::new()
                .with_metadata(PROVIDERS_KEY, serde_json::Value::Object(providers)),
        )
    }

    fn quick_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            window: Duration::from_secs(60),
            cooldown: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold() {
        let breaker = CircuitBreakerInterceptor::new(quick_config());
        let ctx = stage_ctx("llm");
        let ictx = InterceptorContext::new(&ctx);

        for _ in 0..2 {
            breaker.after(&ictx, StageOutput::fail("boom")).await;
        }
        assert!(breaker.is_open("llm"));

        let action = breaker.before(&ictx).await;
        assert!(
            matches!(action, BeforeAction::Fail(ref e) if e.starts_with("circuit_open")),
            "unexpected action: {action:?}"
        );
    }

    #[tokio::test]
    async fn breakers_are_per_stage() {
        let breaker = CircuitBreakerInterceptor::new(quick_config());
        let failing = stage_ctx("failing");
        let healthy = stage_ctx("healthy");

        for _ in 0..2 {
            breaker
                .after(&InterceptorContext::new(&failing), StageOutput::fail("x"))
                .await;
        }

        assert!(breaker.is_open("failing"));
        assert!(matches!(
            breaker.before(&InterceptorContext::new(&healthy)).await,
            BeforeAction::Continue
        ));
    }

    #[tokio::test]
    async fn breakers_are_per_provider_within_a_stage() {
        let breaker = CircuitBreakerInterceptor::new(quick_config());
        let via_a = provider_ctx("llm", "provider-a");
        let via_b = provider_ctx("llm", "provider-b");

        for _ in 0..2 {
            breaker
                .after(&InterceptorContext::new(&via_a), StageOutput::fail("a down"))
                .await;
        }

        // Provider A is open; provider B keeps its own healthy circuit.
        assert!(breaker.is_open_for("llm", "provider-a"));
        assert!(!breaker.is_open_for("llm", "provider-b"));

        let rejected = breaker.before(&InterceptorContext::new(&via_a)).await;
        assert!(
            matches!(rejected, BeforeAction::Fail(ref e) if e.contains("provider-a")),
            "unexpected action: {rejected:?}"
        );
        assert!(matches!(
            breaker.before(&InterceptorContext::new(&via_b)).await,
            BeforeAction::Continue
        ));
    }

    #[tokio::test]
    async fn run_wide_provider_label_is_used_as_fallback() {
        let breaker = CircuitBreakerInterceptor::new(quick_config());
        let ctx = stage_ctx_over(
            "llm",
            ContextSnapshot::new()
                .with_metadata(super::super::PROVIDER_KEY, serde_json::json!("shared")),
        );
        let ictx = InterceptorContext::new(&ctx);

        for _ in 0..2 {
            breaker.after(&ictx, StageOutput::fail("boom")).await;
        }
        assert!(breaker.is_open_for("llm", "shared"));
        assert!(!breaker.is_open("llm"));
    }

    #[tokio::test]
    async fn probe_after_cooldown_closes_on_success() {
        let breaker = CircuitBreakerInterceptor::new(quick_config());
        let ctx = stage_ctx("llm");
        let ictx = InterceptorContext::new(&ctx);

        for _ in 0..2 {
            breaker.after(&ictx, StageOutput::fail("boom")).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Cooldown elapsed: the probe is allowed through.
        assert!(matches!(breaker.before(&ictx).await, BeforeAction::Continue));

        breaker.after(&ictx, StageOutput::ok_empty()).await;
        assert!(!breaker.is_open("llm"));
        assert!(matches!(breaker.before(&ictx).await, BeforeAction::Continue));
    }

    #[tokio::test]
    async fn failed_probe_reopens() {
        let breaker = CircuitBreakerInterceptor::new(quick_config());
        let ctx = stage_ctx("llm");
        let ictx = InterceptorContext::new(&ctx);

        for _ in 0..2 {
            breaker.after(&ictx, StageOutput::fail("boom")).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(breaker.before(&ictx).await, BeforeAction::Continue));

        breaker.after(&ictx, StageOutput::fail("still broken")).await;
        assert!(breaker.is_open("llm"));
    }
}
