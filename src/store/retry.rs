//! # Retry Policy
//!
//! Retries backend calls with Fibonacci backoff.
//!
//! Idempotent calls (reads, listings) retry any backend failure. Mutating
//! calls retry only failures classified as transient, so an ambiguous
//! failure never produces a duplicate version.

use crate::constants::{DEFAULT_RETRY_BASE_DELAY_MS, MAX_RETRY_DELAY_MS};
use crate::error::{Result, StoreError};
use crate::observability::metrics;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Whether a call may be repeated without side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-indexed): base × fib(attempt + 1), capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let (mut current, mut next) = (1u32, 1u32);
        for _ in 0..attempt {
            let sum = current.saturating_add(next);
            current = next;
            next = sum;
        }
        self.base_delay
            .saturating_mul(current)
            .min(self.max_delay)
    }

    fn should_retry(err: &StoreError, idempotency: Idempotency) -> bool {
        match err {
            StoreError::Backend(e) => match idempotency {
                Idempotency::Idempotent => true,
                Idempotency::Mutating => e.transient,
            },
            _ => false,
        }
    }

    /// Run `call` until it succeeds, fails permanently, or retries run out
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `call`.
    pub async fn run<T, F, Fut>(&self, operation: &str, idempotency: Idempotency, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && Self::should_retry(&e, idempotency) => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {}",
                        operation,
                        attempt,
                        self.max_retries,
                        delay.as_millis(),
                        e
                    );
                    metrics::increment_retries(operation);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
