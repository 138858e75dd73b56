//! Bounded exponential backoff around a generation call.
//!
//! Independent of any backend: the policy only sees a closure producing a future, or a
//! `&dyn GenerationClient` through [`RetryPolicy::generate`].

use crate::error::GenerationError;
use crate::provider::{GenerationClient, GenerationRequest};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform random jitter added to every wait.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub const PRIMARY_ATTEMPTS: u32 = 4;
    pub const REPAIR_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter,
        }
    }

    /// Policy for first-pass generation calls.
    pub fn primary() -> Self {
        Self::new(
            Self::PRIMARY_ATTEMPTS,
            Duration::from_millis(400),
            Duration::from_millis(250),
        )
    }

    /// Policy for repair, compression and expansion passes.
    pub fn repair() -> Self {
        Self::new(
            Self::REPAIR_ATTEMPTS,
            Duration::from_millis(400),
            Duration::from_millis(250),
        )
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Wait before the retry that follows failed attempt `attempt` (0-based):
    /// `base * 2^attempt + jitter`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let upper = self.max_jitter.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(0..=upper))
        };
        exponential.saturating_add(jitter)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// `op` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, GenerationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt + 1 >= self.max_attempts => {
                    warn!(
                        label,
                        attempts = attempt + 1,
                        error = %err,
                        "Retry attempts exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient generation failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Retry a single generation request against `client`.
    pub async fn generate(
        &self,
        client: &dyn GenerationClient,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        self.run(&request.label, |_| client.generate(request)).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::primary()
    }
}
