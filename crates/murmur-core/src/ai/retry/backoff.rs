//! Exponential backoff with jitter

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Errors that know whether a retry may succeed
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ClientError {
    fn is_retryable(&self) -> bool {
        ClientError::is_retryable(self)
    }
}

/// HTTP statuses worth retrying
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::constants::ai::DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Delay before retry number `attempt` (1-based), with ±10% jitter
pub fn delay_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_factor
        .powi(attempt.saturating_sub(1) as i32);
    let base = (config.initial_delay.as_millis() as f64 * exp)
        .min(config.max_delay.as_millis() as f64);
    let jitter = rand::thread_rng().gen_range(0.9..1.1);
    Duration::from_millis((base * jitter) as u64)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let delay = delay_for_attempt(config, attempt);
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    label, err, attempt, config.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                debug!("{} failed after {} retries: {}", label, attempt, err);
                return Err(err);
            }
        }
    }
}
