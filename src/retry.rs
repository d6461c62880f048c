//! Bounded retries with backoff and cancellation
use core::sync::atomic::{AtomicBool, Ordering};
use fugit::{ExtU32, MillisDurationU32};

/// Growth of the delay between attempts
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every attempt
    Fixed,

    /// Delay is multiplied by `factor` after every attempt, capped at `max`
    Exponential { factor: u32, max: MillisDurationU32 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts including the first one, at least 1
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub delay: MillisDurationU32,

    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: MillisDurationU32) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub const fn exponential(max_attempts: u32, delay: MillisDurationU32, max: MillisDurationU32) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential { factor: 2, max },
        }
    }

    /// Starts a new sequence of attempts
    pub fn start<'a>(&self, cancel: &'a AtomicBool) -> Retry<'a> {
        Retry {
            policy: *self,
            failures: 0,
            next_delay: self.delay,
            cancel,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, 1_000.millis())
    }
}

/// Decision after a failed attempt
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait for the given duration, then try again
    Wait(MillisDurationU32),

    /// Attempt budget is spent
    Exhausted,

    /// Cancellation flag was raised
    Cancelled,
}

/// State of a running sequence of attempts
pub struct Retry<'a> {
    policy: RetryPolicy,

    /// Number of failed attempts so far
    failures: u32,

    next_delay: MillisDurationU32,

    cancel: &'a AtomicBool,
}

impl Retry<'_> {
    /// Registers a failed attempt and decides how to proceed
    pub fn next(&mut self) -> RetryStep {
        if self.is_cancelled() {
            return RetryStep::Cancelled;
        }

        self.failures += 1;
        if self.failures >= self.policy.max_attempts.max(1) {
            return RetryStep::Exhausted;
        }

        let delay = self.next_delay;
        if let Backoff::Exponential { factor, max } = self.policy.backoff {
            let grown = delay.to_millis().saturating_mul(factor).min(max.to_millis());
            self.next_delay = grown.millis();
        }

        RetryStep::Wait(delay)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
