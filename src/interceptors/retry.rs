//! Retry with exponential backoff and jitter.

use super::{ErrorAction, Interceptor, InterceptorContext};
use rand::Rng;
use std::time::Duration;

/// Tuning for [`RetryInterceptor`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total executions allowed, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Upper bound on the computed delay.
    pub max_delay: Duration,
    /// Error-code prefixes considered retryable. Empty retries everything.
    pub retryable_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            retryable_codes: Vec::new(),
        }
    }
}

/// Re-runs failing stage bodies with `base * 2^attempt` backoff and full
/// jitter.
///
/// Upstream outputs and run identity are untouched between attempts, and
/// the pipeline timer keeps running.
#[derive(Debug, Clone, Default)]
pub struct RetryInterceptor {
    config: RetryConfig,
}

impl RetryInterceptor {
    /// A retry interceptor with the given tuning.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Shorthand: `max_attempts` executions with exponential backoff from
    /// `base_delay`.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(RetryConfig {
            max_attempts,
            base_delay,
            ..RetryConfig::default()
        })
    }

    /// Restricts retries to errors whose code matches one of the prefixes.
    #[must_use]
    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = String>) -> Self {
        self.config.retryable_codes = codes.into_iter().collect();
        self
    }

    fn is_retryable(&self, error: &str) -> bool {
        if self.config.retryable_codes.is_empty() {
            return true;
        }
        self.config
            .retryable_codes
            .iter()
            .any(|code| error.starts_with(code.as_str()))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.config.max_delay);
        // Full jitter in [0, capped].
        let millis = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

#[async_trait::async_trait]
impl Interceptor for RetryInterceptor {
    fn name(&self) -> &str {
        "retry"
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn on_error(
        &self,
        _ictx: &InterceptorContext<'_>,
        error: &str,
        attempt: u32,
    ) -> ErrorAction {
        if attempt + 1 >= self.config.max_attempts || !self.is_retryable(error) {
            return ErrorAction::Propagate;
        }
        ErrorAction::Retry {
            delay: self.delay_for(attempt),
        }
    }
}
