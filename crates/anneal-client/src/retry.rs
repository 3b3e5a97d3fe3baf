//! Retry and backoff policy shared by submission, status and cancel calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Decision for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay and try again.
    Retry(Duration),
    /// Stop and report the error.
    GiveUp,
}

/// Exponential backoff with jitter, bounded by attempts and elapsed time.
///
/// The delay after the `n`-th failed attempt is
/// `min(base_delay · 2^(n-1), max_delay)`, stretched by a random factor in
/// `[1, 1 + jitter]`. A `Retry-After` hint on the error replaces the computed
/// delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Cap for a single computed delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Total time budget across all attempts
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,
    /// Relative jitter in `[0, 1]`
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_elapsed_ms: default_max_elapsed(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Deterministic delay after the `attempt`-th failure (1-based), before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Decide what to do after the `attempt`-th failure.
    pub fn decide(&self, attempt: u32, elapsed: Duration, error: &ClientError) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = error
            .retry_after()
            .unwrap_or_else(|| self.jittered(self.backoff_delay(attempt)));
        if elapsed + delay > Duration::from_millis(self.max_elapsed_ms) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay.mul_f64(1.0 + factor)
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// Retries are invisible to the caller apart from latency; the last
    /// error is returned once the policy gives up.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match f().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            match self.decide(attempt, started.elapsed(), &error) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        operation,
                        attempt,
                        error = %error,
                        "Retrying after transient failure (backoff {:?})",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    debug!(operation, attempt, error = %error, "Giving up");
                    return Err(error);
                }
            }
        }
    }

    pub(crate) fn validate(&self) -> ClientResult<()> {
        if self.max_attempts == 0 {
            return Err(ClientError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ClientError::Configuration(
                "retry.jitter must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    6
}

fn default_base_delay() -> u64 {
    200
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_elapsed() -> u64 {
    // 5 minutes
    300_000
}

fn default_jitter() -> f64 {
    0.25
}
