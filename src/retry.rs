use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TaskError;

/// Fixed-delay retry policy applied around every task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same delay, different attempt budget.
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }
}

/// Result of driving an operation through the retry loop.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, TaskError>,
    /// Attempts actually started.
    pub attempts: u32,
}

pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        let mut policy = policy;
        if policy.max_attempts == 0 {
            policy.max_attempts = 1;
        }
        Self { policy }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget runs out.
    ///
    /// Cancellation never interrupts an attempt in progress; it stops the
    /// wait before the next one and the last attempt's error is kept.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        ctx: &CancellationToken,
        task_name: &str,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(task = %task_name, attempt, "starting attempt");

            let err = match operation(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.policy.max_attempts {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }

            warn!(
                task = %task_name,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = self.policy.delay.as_millis() as u64,
                error = %err,
                "attempt failed; retrying"
            );

            tokio::select! {
                _ = ctx.cancelled() => {
                    warn!(task = %task_name, attempt, "cancelled while waiting to retry");
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
                _ = sleep(self.policy.delay) => {}
            }
        }
    }
}
