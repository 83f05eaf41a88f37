//! Exponential backoff
//!
//! One policy type drives every retry layer: the HTTP wrapper, cached
//! queries and mutations. Attempts are 1-based; the delay before retry `n`
//! is `base * 2^(n-1)`, optionally capped.

use std::future::Future;
use std::time::Duration;

use crate::client::ClientError;
use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: None,
        }
    }

    pub const fn with_max_delay(self, max_delay: Duration) -> Self {
        Self {
            max_delay: Some(max_delay),
            ..self
        }
    }

    /// Single attempt
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Transport retries: 3 attempts from 1 s, uncapped
    pub const fn http() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Cached query retries: 3 attempts, capped at 30 s
    pub const fn query() -> Self {
        Self::new(3, Duration::from_secs(1)).with_max_delay(Duration::from_secs(30))
    }

    /// Mutation retries: 2 attempts, capped at 10 s
    pub const fn mutation() -> Self {
        Self::new(2, Duration::from_secs(1)).with_max_delay(Duration::from_secs(10))
    }

    pub fn http_from(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }

    pub fn query_from(config: &ClientConfig) -> Self {
        Self::new(config.query_retries, config.retry_base_delay())
            .with_max_delay(config.query_max_delay())
    }

    pub fn mutation_from(config: &ClientConfig) -> Self {
        Self::new(config.mutation_retries, config.retry_base_delay())
            .with_max_delay(config.mutation_max_delay())
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        let delay = self.base_delay.checked_mul(factor).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `op`, retrying while `should_retry` accepts the error
    ///
    /// Returns the last error once `max_retries` retries have been spent.
    pub async fn retry<T, F, Fut>(
        &self,
        label: &str,
        mut op: F,
        should_retry: impl Fn(&ClientError) -> bool,
    ) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && should_retry(&e) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        label,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::http()
    }
}
