//! A cancelable delayed value with "last write wins" semantics.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Holds at most one pending value and the instant it becomes due.
///
/// Scheduling a new value always replaces the pending one and restarts the
/// quiet period, so only a value that survives a full `delay` uninterrupted is
/// ever delivered by [`Debounce::settled`].
#[derive(Debug)]
pub struct Debounce<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debounce<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Replaces any pending value. Returns `true` if one was superseded.
    pub fn schedule(&mut self, value: T) -> bool {
        self.pending
            .replace((Instant::now() + self.delay, value))
            .is_some()
    }

    /// Drops the pending value, if any.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Waits for the pending value to become due and takes it.
    ///
    /// Never resolves while nothing is pending. Cancel-safe: dropping the
    /// future before it resolves leaves the pending value untouched, which
    /// makes it suitable as a `tokio::select!` branch.
    pub async fn settled(&mut self) -> T {
        loop {
            let deadline = match &self.pending {
                Some((deadline, _)) => *deadline,
                None => return std::future::pending().await,
            };
            sleep_until(deadline).await;
            if let Some((_, value)) = self.pending.take() {
                return value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_value_fires_after_delay() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(500));
        debounce.schedule(1);

        assert_eq!(debounce.settled().await, 1);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(!debounce.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_supersedes_pending_value() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(500));

        assert!(!debounce.schedule(0.1));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(debounce.schedule(0.2));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(debounce.schedule(0.3));

        assert_eq!(debounce.settled().await, 0.3);
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_delivery() {
        let mut debounce = Debounce::new(Duration::from_millis(50));
        debounce.schedule("x");
        assert_eq!(debounce.cancel(), Some("x"));

        let waited = tokio::time::timeout(Duration::from_secs(1), debounce.settled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_keeps_value() {
        let mut debounce = Debounce::new(Duration::from_millis(500));
        debounce.schedule(7);

        let early = tokio::time::timeout(Duration::from_millis(100), debounce.settled()).await;
        assert!(early.is_err());
        assert!(debounce.is_pending());
        assert_eq!(debounce.settled().await, 7);
    }
}
