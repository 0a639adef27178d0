//! Bounded health probing for freshly spawned nodes.

use std::thread;
use std::time::Duration;
use takeoff_client::ApiClient;
use takeoff_config::{Backoff, ProbeSettings};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// How often and how long to probe a starting node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of health checks before giving up.
    pub max_attempts: u32,

    /// Delay after the first failed check.
    pub interval: Duration,

    /// Growth of the delay between checks.
    pub backoff: Backoff,

    /// Upper bound for exponential delays.
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Fixed,
            max_interval: interval,
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max_interval: Duration) -> Self {
        Self {
            max_attempts,
            interval: initial,
            backoff: Backoff::Exponential,
            max_interval,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(16);
                self.interval
                    .saturating_mul(1 << exponent)
                    .min(self.max_interval)
            }
        }
    }

    /// Sum of all delays a fully failing probe sleeps through.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

impl Default for RetryPolicy {
    /// 20 checks two seconds apart.
    fn default() -> Self {
        Self::fixed(20, Duration::from_secs(2))
    }
}

impl From<&ProbeSettings> for RetryPolicy {
    fn from(settings: &ProbeSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            interval: Duration::from_millis(settings.interval_ms),
            backoff: settings.backoff,
            max_interval: Duration::from_millis(settings.max_interval_ms),
        }
    }
}

/// Polls a node's health endpoint until it answers or the policy runs out.
///
/// Connection-level failures and 5xx answers are retried. Any other failure
/// ends probing at once, as does the node's process exiting.
#[derive(Debug, Clone, Default)]
pub struct HealthProber {
    policy: RetryPolicy,
}

impl HealthProber {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Blocks until `client` reports healthy. Returns the attempt that
    /// succeeded.
    ///
    /// `alive` is consulted before every attempt.
    pub fn wait_until_healthy<F>(&self, node: &str, client: &ApiClient, mut alive: F) -> Result<u32>
    where
        F: FnMut() -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_failure = String::from("no health check attempted");

        for attempt in 1..=max_attempts {
            if !alive() {
                warn!(node, attempt, "node exited before becoming healthy");
                return Err(Error::StartupFailed {
                    node: node.to_string(),
                    attempts: attempt - 1,
                    reason: "process exited before becoming healthy".to_string(),
                });
            }

            match client.health_check() {
                Ok(_) => {
                    info!(node, attempt, "node healthy");
                    return Ok(attempt);
                }
                Err(e) if e.is_retryable() => {
                    debug!(node, attempt, max_attempts, error = %e, "node not ready");
                    last_failure = e.to_string();
                }
                Err(e) => {
                    warn!(node, attempt, error = %e, "health check failed permanently");
                    return Err(Error::StartupFailed {
                        node: node.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }

            if attempt < max_attempts {
                thread::sleep(self.policy.delay_after(attempt));
            }
        }

        Err(Error::StartupFailed {
            node: node.to_string(),
            attempts: max_attempts,
            reason: last_failure,
        })
    }
}
