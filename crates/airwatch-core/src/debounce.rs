//! Trailing-edge debouncer for bursty inputs such as map viewport changes.
//!
//! A [`Debouncer`] holds at most one pending value. Every [`push`] replaces
//! it and restarts the quiet period; [`ready`] resolves with the latest value
//! once the quiet period elapses without another push. Intended for use as
//! one branch of a `tokio::select!` loop owned by a single task, which keeps
//! at most one downstream recompute in flight.
//!
//! [`push`]: Debouncer::push
//! [`ready`]: Debouncer::ready

use std::time::Duration;

use tokio::time::Instant;

/// Coalesces a burst of values into the last one.
#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    /// Create an idle debouncer with the given quiet period.
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            deadline: None,
        }
    }

    /// Replace the pending value and restart the quiet period.
    pub fn push(&mut self, value: T) {
        self.pending = Some(value);
        let now = Instant::now();
        self.deadline = Some(now.checked_add(self.quiet).unwrap_or(now));
    }

    /// Whether a value is waiting for its quiet period to elapse.
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any pending value.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    /// Wait out the quiet period and take the pending value.
    ///
    /// Never resolves while idle. Cancel safe: if the future is dropped
    /// before completing, the pending value stays in place.
    pub async fn ready(&mut self) -> T {
        let Some(deadline) = self.deadline else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;
        self.deadline = None;
        match self.pending.take() {
            Some(value) => value,
            None => std::future::pending().await,
        }
    }
}
