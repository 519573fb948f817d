//! Time utilities and the injectable clock.
//!
//! All sleeping in the engine (retry backoff, inter-chunk pacing) goes
//! through the [`Clock`] trait so tests can run without real wall-clock
//! delays. Production code uses [`TokioClock`]; tests use [`ManualClock`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Clock abstraction for anything that needs to read time or sleep.
///
/// Retry backoff is a pure function of the attempt count; the clock is
/// the only impure part, injected so tests stay instantaneous.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in milliseconds.
    fn now_millis(&self) -> i64;

    /// Suspend the calling task for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by chrono and the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        now_timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock for tests and simulations.
///
/// `sleep` never suspends; it advances the internal timestamp by the
/// requested duration and records the total time "slept" so tests can
/// assert on backoff behavior.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_millis: AtomicI64,
    slept_millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock starting at the given Unix timestamp (milliseconds).
    pub fn new(start_millis: i64) -> Self {
        Self {
            now_millis: AtomicI64::new(start_millis),
            slept_millis: AtomicI64::new(0),
        }
    }

    /// Advance the clock without counting it as sleep.
    pub fn advance(&self, duration: Duration) {
        self.now_millis
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }

    /// Total milliseconds requested via `sleep` since construction.
    pub fn total_slept_millis(&self) -> i64 {
        self.slept_millis.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_millis.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        let millis = duration.as_millis() as i64;
        self.now_millis.fetch_add(millis, Ordering::SeqCst);
        self.slept_millis.fetch_add(millis, Ordering::SeqCst);
    }
}
