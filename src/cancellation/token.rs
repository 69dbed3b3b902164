//! Cancellation token with linked children for subruns.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

type CancelCallback = Box<dyn Fn() + Send + Sync>;

/// Cooperative cancellation signal for one pipeline run.
///
/// Cancellation is idempotent: the first reason wins and later calls are
/// ignored. Callbacks registered with [`on_cancel`](Self::on_cancel) fire
/// exactly once; a callback registered after cancellation fires
/// immediately. Panics inside callbacks are logged and suppressed.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<CancelCallback>>,
    notify: Notify,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        *self.reason.write() = Some(reason.into());
        self.notify.notify_waiters();

        let callbacks = std::mem::take(&mut *self.callbacks.write());
        for callback in &callbacks {
            run_callback(callback);
        }
    }

    /// True once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The cancellation reason, once set.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Resolves when cancellation is requested. Safe to call from several
    /// tasks at once.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Registers a callback to run on cancellation. Fires immediately when
    /// the token is already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            run_callback(&callback);
            return;
        }
        self.callbacks.write().push(Box::new(callback));
    }

    /// Creates a child token that cancels when this token cancels. The
    /// child may also be cancelled independently without affecting the
    /// parent.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        let child = Arc::new(Self::new());
        let linked = Arc::downgrade(&child);
        self.on_cancel(move || {
            if let Some(token) = linked.upgrade() {
                token.cancel("parent run cancelled");
            }
        });
        child
    }
}

fn run_callback(callback: &(dyn Fn() + Send + Sync)) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)).is_err() {
        warn!("cancellation callback panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
