use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use tokio::time::{sleep_until, Instant};

use crate::error::SpaResult;

/// Reference time between two reads of the observed value.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Reference time a command may take to take effect.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one verified state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The spa reported the target value before the deadline.
    Confirmed { observed: T },
    /// The request was not accepted for dispatch. Nothing was polled.
    NotAccepted,
    /// The request was accepted but the target value was never observed.
    TimedOut { last_observed: T },
}

impl<T> Outcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed { .. })
    }
}

/// Issues a command and waits for the spa to report the commanded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandVerifier {
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for CommandVerifier {
    fn default() -> Self {
        CommandVerifier::new(DEFAULT_POLL_INTERVAL, DEFAULT_VERIFY_TIMEOUT)
    }
}

impl CommandVerifier {
    /// Both durations must be non-zero.
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        debug_assert!(!poll_interval.is_zero(), "poll interval must be non-zero");
        debug_assert!(!timeout.is_zero(), "timeout must be non-zero");
        CommandVerifier {
            poll_interval,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /**
    Sends `target` through `setter` once, then polls `getter` until it returns
    `target` or the timeout elapses.

    The first poll happens right after the set request, so a request for the
    value the spa already has is confirmed immediately. A rejected or failed
    request returns [`Outcome::NotAccepted`] without polling. Values are
    compared exactly; the spa reports quantized values.

    A timeout is never returned before `timeout` has elapsed, and at the latest
    one poll interval after it.
     */
    pub async fn verify<T, S, Fut, G>(&self, setter: S, getter: G, target: T) -> Outcome<T>
    where
        T: PartialEq + Clone + Debug,
        S: FnOnce(T) -> Fut,
        Fut: Future<Output = SpaResult<bool>>,
        G: Fn() -> T,
    {
        match setter(target.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Request for {:?} was not accepted", target);
                return Outcome::NotAccepted;
            }
            Err(e) => {
                warn!("Request for {:?} failed: {}", target, e);
                return Outcome::NotAccepted;
            }
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let observed = getter();
            if observed == target {
                return Outcome::Confirmed { observed };
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    "{:?} not observed after {:?}; last observed {:?}",
                    target, self.timeout, observed
                );
                return Outcome::TimedOut {
                    last_observed: observed,
                };
            }
            sleep_until(deadline.min(now + self.poll_interval)).await;
        }
    }
}
