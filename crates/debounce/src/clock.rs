//! Time source for the dispatcher
//!
//! Everything time-related in the dispatcher goes through [`Clock`] so that
//! tests can run the delay logic on tokio's paused clock.

use async_trait::async_trait;
use tokio::time::Instant;

/// Monotonic time source
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current instant
    fn now(&self) -> Instant;

    /// Sleep until `deadline` (returns immediately if it has passed)
    async fn sleep_until(&self, deadline: Instant);
}

/// Clock backed by `tokio::time`
///
/// Under `#[tokio::test(start_paused = true)]` this clock is virtual and
/// auto-advances while the runtime is idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}
