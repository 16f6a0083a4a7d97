//! Bounded polling with backoff and cooperative cancellation.
//!
//! Every convergence loop in the workflow (pod readiness, endpoint discovery)
//! goes through [`poll_until`]. Sleeping happens on the calling thread in
//! short slices so a [`CancelFlag`] raised from a signal handler is noticed
//! within [`CANCEL_CHECK_SLICE`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::error::InstallError;

pub const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub interval: Duration,
    /// `None` retries until success or cancellation.
    pub max_attempts: Option<u32>,
    /// Applied to the delay after every failed attempt; 1.0 keeps it fixed.
    pub backoff_multiplier: f64,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
            backoff_multiplier: 1.0,
            max_interval: interval,
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            backoff_multiplier: 1.0,
            max_interval: interval,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let ceiling = self.max_interval.max(self.interval);
        let capped = scaled.min(ceiling.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(ceiling)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempt >= max)
    }
}

/// Shared cancellation request, raised by the SIGINT handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn shared(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// What a single poll attempt observed.
#[derive(Debug)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Sleep for `total`, returning early with `false` if cancellation was requested.
///
/// A `total` past the clock's range sleeps until cancelled.
pub fn sleep_cancellable(total: Duration, cancel: &CancelFlag) -> bool {
    let deadline = Instant::now().checked_add(total);
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        let remaining = match deadline {
            Some(deadline) if now >= deadline => return true,
            Some(deadline) => deadline - now,
            None => CANCEL_CHECK_SLICE,
        };
        std::thread::sleep(remaining.min(CANCEL_CHECK_SLICE));
    }
}

/// Call `attempt` until it reports [`Poll::Ready`].
///
/// `attempt` receives the 1-based attempt number. The policy's first sleep
/// happens before the first attempt, matching the installer's habit of giving
/// the cluster one interval to react after a mutation.
pub fn poll_until<T, F>(
    what: &str,
    policy: &RetryPolicy,
    cancel: &CancelFlag,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Poll<T>,
{
    let start = Instant::now();
    let mut n = 0u32;
    let mut delay = policy.interval;
    loop {
        if !sleep_cancellable(delay, cancel) {
            return Err(InstallError::Cancelled(what.to_string()).into());
        }
        n += 1;
        match attempt(n) {
            Poll::Ready(value) => return Ok(value),
            Poll::Pending => {
                if policy.exhausted(n) {
                    return Err(InstallError::Convergence {
                        what: what.to_string(),
                        attempts: n,
                        elapsed: start.elapsed(),
                    }
                    .into());
                }
                delay = policy.delay_after(n);
                debug!(what, attempt = n, delay_ms = delay.as_millis() as u64, "not ready yet");
            }
        }
    }
}
