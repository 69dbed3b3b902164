//! Per-stage execution deadline.

use super::{Interceptor, InterceptorContext};
use std::collections::HashMap;
use std::time::Duration;

/// Bounds how long a stage body may run.
///
/// Expiry produces `FAIL` with the `timeout` code; it is reported
/// distinctly from user cancellation. Per-stage overrides take precedence
/// over the default deadline.
#[derive(Debug, Clone)]
pub struct TimeoutInterceptor {
    default_deadline: Duration,
    per_stage: HashMap<String, Duration>,
}

impl TimeoutInterceptor {
    /// A timeout applying `deadline` to every stage.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self {
            default_deadline: deadline,
            per_stage: HashMap::new(),
        }
    }

    /// Overrides the deadline for one stage.
    #[must_use]
    pub fn with_stage_deadline(mut self, stage: impl Into<String>, deadline: Duration) -> Self {
        self.per_stage.insert(stage.into(), deadline);
        self
    }
}

#[async_trait::async_trait]
impl Interceptor for TimeoutInterceptor {
    fn name(&self) -> &str {
        "timeout"
    }

    fn priority(&self) -> i32 {
        -100
    }

    fn deadline(&self, ictx: &InterceptorContext<'_>) -> Option<Duration> {
        Some(
            self.per_stage
                .get(ictx.stage_name())
                .copied()
                .unwrap_or(self.default_deadline),
        )
    }
}
