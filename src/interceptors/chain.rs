//! Composition of interceptors into one ordered chain.

use super::{BeforeAction, ErrorAction, Interceptor, InterceptorContext};
use crate::core::StageOutput;
use std::sync::Arc;
use std::time::Duration;

/// An ordered set of interceptors wrapping every stage of a run.
///
/// Ordering is by ascending priority; equal priorities keep registration
/// order. Composition is russian-doll style: `before` hooks walk outward
/// in, `after` hooks inward out.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain from interceptors, sorting by priority.
    #[must_use]
    pub fn from_interceptors(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        let mut chain = Self { interceptors };
        chain.sort();
        chain
    }

    /// Adds one interceptor, keeping the chain ordered.
    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
        self.sort();
    }

    fn sort(&mut self) {
        // Stable sort: equal priorities keep registration order.
        self.interceptors.sort_by_key(|i| i.priority());
    }

    /// Number of interceptors in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// True when the chain has no interceptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Runs `before` hooks in priority order. The first hook that does not
    /// continue decides the outcome.
    pub async fn run_before(&self, ictx: &InterceptorContext<'_>) -> BeforeAction {
        for interceptor in &self.interceptors {
            match interceptor.before(ictx).await {
                BeforeAction::Continue => {}
                decisive => return decisive,
            }
        }
        BeforeAction::Continue
    }

    /// Runs `after` hooks in reverse priority order.
    pub async fn run_after(
        &self,
        ictx: &InterceptorContext<'_>,
        mut output: StageOutput,
    ) -> StageOutput {
        for interceptor in self.interceptors.iter().rev() {
            output = interceptor.after(ictx, output).await;
        }
        output
    }

    /// Consults `on_error` hooks in priority order. The first decision
    /// other than propagate wins.
    pub async fn handle_error(
        &self,
        ictx: &InterceptorContext<'_>,
        error: &str,
        attempt: u32,
    ) -> ErrorAction {
        for interceptor in &self.interceptors {
            match interceptor.on_error(ictx, error, attempt).await {
                ErrorAction::Propagate => {}
                decisive => return decisive,
            }
        }
        ErrorAction::Propagate
    }

    /// The tightest deadline any interceptor imposes, if any.
    #[must_use]
    pub fn deadline(&self, ictx: &InterceptorContext<'_>) -> Option<Duration> {
        self.interceptors
            .iter()
            .filter_map(|i| i.deadline(ictx))
            .min()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|i| i.name()))
            .finish()
    }
}
