//! Bounded polling
//!
//! Both read-side waits (destination finalization, signature collection) run
//! through [`Poller`]: suspend one interval, check, then either finish with a
//! value or go again until the attempt budget is spent. Check errors are not
//! retried; they end the poll immediately.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Interval and attempt budget of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 20,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound of time spent sleeping before the budget is exhausted
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Terminal result of a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    Exhausted { attempts: u32 },
}

/// Explicit poll-loop state
#[derive(Debug)]
pub struct Poller {
    policy: PollPolicy,
    attempts: u32,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Sleep one interval and count an attempt; `false` once the budget is spent
    pub async fn tick(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        tokio::time::sleep(self.policy.interval).await;
        self.attempts += 1;
        true
    }

    /// Drive `check` until it yields a value or the budget runs out
    pub async fn run<T, E, F, Fut>(mut self, what: &str, mut check: F) -> Result<PollOutcome<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        while self.tick().await {
            debug!(what, attempt = self.attempts, max = self.policy.max_attempts, "Polling");
            if let Some(value) = check(self.attempts).await? {
                return Ok(PollOutcome::Ready(value));
            }
        }
        Ok(PollOutcome::Exhausted {
            attempts: self.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt() {
        let start = Instant::now();
        let outcome: Result<_, eyre::Report> = Poller::new(PollPolicy::default())
            .run("value", |attempt| async move {
                Ok((attempt == 3).then_some(attempt))
            })
            .await;

        assert_eq!(outcome.unwrap(), PollOutcome::Ready(3));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_exactly() {
        let policy = PollPolicy::default();
        let start = Instant::now();
        let mut checks = 0u32;
        let outcome: Result<PollOutcome<()>, eyre::Report> = Poller::new(policy)
            .run("never", |_| {
                checks += 1;
                async { Ok(None) }
            })
            .await;

        assert_eq!(outcome.unwrap(), PollOutcome::Exhausted { attempts: 20 });
        assert_eq!(checks, 20);
        assert_eq!(start.elapsed(), policy.budget());
        assert_eq!(policy.budget(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_polling() {
        let mut checks = 0u32;
        let outcome: Result<PollOutcome<()>, eyre::Report> = Poller::new(PollPolicy::default())
            .run("failing", |_| {
                checks += 1;
                async { Err(eyre!("rpc down")) }
            })
            .await;

        assert!(outcome.is_err());
        assert_eq!(checks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget() {
        let mut poller = Poller::new(PollPolicy::new(Duration::from_secs(1), 0));
        assert!(!poller.tick().await);
        assert_eq!(poller.attempts(), 0);
    }
}
