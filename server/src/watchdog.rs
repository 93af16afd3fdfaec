//! Restartable idle timer owned by a single session.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

/// Single-shot countdown that is pushed back on every [`reset`](Self::reset).
///
/// Armed on construction. [`expired`](Self::expired) is cancel-safe, so it
/// can sit in a `tokio::select!` loop next to the session's other inputs.
#[derive(Debug)]
pub struct IdleWatchdog {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl IdleWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sleep: Box::pin(sleep(timeout)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.sleep.deadline()
    }

    /// Cancel the pending expiry and start a fresh countdown.
    pub fn reset(&mut self) {
        let deadline = Instant::now() + self.timeout;
        self.sleep.as_mut().reset(deadline);
    }

    /// Resolves once `timeout` has passed without a reset.
    pub async fn expired(&mut self) {
        self.sleep.as_mut().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let start = Instant::now();
        let mut watchdog = IdleWatchdog::new(Duration::from_millis(15_000));
        watchdog.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_pushes_deadline_back() {
        let mut watchdog = IdleWatchdog::new(Duration::from_millis(15_000));
        tokio::time::advance(Duration::from_millis(10_000)).await;
        watchdog.reset();
        let reset_at = Instant::now();

        // still pending just before the new deadline
        let early = tokio::time::timeout(Duration::from_millis(14_999), watchdog.expired()).await;
        assert!(early.is_err());

        watchdog.expired().await;
        assert!(reset_at.elapsed() >= Duration::from_millis(15_000));
        assert_eq!(watchdog.deadline(), reset_at + watchdog.timeout());
    }
}
