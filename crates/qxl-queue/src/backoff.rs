//! Back-pressure policy for pushes into a full queue.
//!
//! A full queue makes the producer wait a bounded number of fixed delays before reporting
//! overload. The wait itself goes through [`Delay`] so hosts can plug in their own timer and tests
//! can observe (or act during) each retry without sleeping.

use std::time::Duration;

/// Default number of retries before a push reports overload.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;

/// Default wait between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_micros(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of waits a push may spend on a full queue. `0` fails immediately.
    pub retry_limit: u32,
    /// Duration of each wait.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub const fn new(retry_limit: u32, retry_delay: Duration) -> Self {
        Self {
            retry_limit,
            retry_delay,
        }
    }

    /// Policy that never waits: a full queue is reported as overloaded straight away.
    pub const fn fail_fast() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Upper bound on how long a single push can block the producer.
    pub fn total_budget(&self) -> Duration {
        self.retry_delay.saturating_mul(self.retry_limit)
    }
}

/// Waits between push retries.
pub trait Delay: Send + Sync {
    fn delay(&self, duration: Duration);
}

/// Blocks the calling thread with [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn delay(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay(&self, _duration: Duration) {}
}

impl<F> Delay for F
where
    F: Fn(Duration) + Send + Sync,
{
    fn delay(&self, duration: Duration) {
        self(duration)
    }
}
