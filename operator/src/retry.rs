//! Bounded retries with exponential backoff and jitter.
use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use rand::{Rng, RngCore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute an async operation until it succeeds, fails for good or runs out of attempts.
///
/// Only errors accepted by `is_retryable` are retried. Each delay is jittered to
/// 0.5x-1.5x using `rng`. Cancellation during a delay returns the last error.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    rng: &Mutex<impl RngCore>,
    cancel: &CancellationToken,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };
        if !is_retryable(&err) || attempt >= config.max_attempts {
            return Err(err);
        }

        let jitter: f64 = {
            let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0.5..1.5)
        };
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = jittered_delay.as_millis(),
            "operation failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(err),
            _ = tokio::time::sleep(jittered_delay) => {}
        }

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
