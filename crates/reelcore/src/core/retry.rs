//! Backoff policies and a retry loop for transient failures.
//!
//! Two callers: the bot waits for the Bot API at startup with a flat delay,
//! and the resumable uploader backs off with full jitter between chunks.
//! Server hints (`retry_after`) take precedence over computed delays.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// How randomness is applied to the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Exact delays
    None,
    /// Uniform in `[0, delay)`, i.e. `random() * base * multiplier^attempt`
    Full,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Ceiling applied before jitter
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: Jitter,
}

impl RetryConfig {
    /// Bot API startup: the local Bot API server may still be booting.
    pub fn startup() -> Self {
        Self {
            max_retries: 60,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.0,
            jitter: Jitter::None,
        }
    }

    /// Resumable uploads: `random() * 2^attempt` seconds, 10 retries.
    pub fn resumable_upload() -> Self {
        let max_retries = crate::core::config::upload::MAX_RETRIES;
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2u64.pow(max_retries)),
            backoff_multiplier: 2.0,
            jitter: Jitter::Full,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ceiling = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        let delay = match self.jitter {
            Jitter::None => ceiling,
            Jitter::Full => rand::random::<f64>() * ceiling,
        };
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Outcome of [`retry`] with the number of attempts it took.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Errors that know whether repeating the request can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-provided wait, e.g. from a rate-limit answer.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for reqwest::Error {
    fn is_retryable(&self) -> bool {
        if self.is_timeout() || self.is_connect() || self.is_request() || self.is_body() {
            return true;
        }
        self.status().is_some_and(|s| s.is_server_error())
    }
}

#[cfg(feature = "telegram")]
impl Retryable for teloxide::RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            teloxide::RequestError::Network(_)
            | teloxide::RequestError::RetryAfter(_)
            | teloxide::RequestError::Io(_) => true,
            teloxide::RequestError::Api(api_error) => {
                let text = format!("{:?}", api_error).to_lowercase();
                ["restart", "bad gateway", "service unavailable", "gateway timeout"]
                    .iter()
                    .any(|needle| text.contains(needle))
            }
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            teloxide::RequestError::RetryAfter(seconds) => Some(seconds.duration()),
            _ => None,
        }
    }
}

/// Abstraction over `tokio::time::sleep`.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs `operation` until it succeeds, fails permanently or runs out of retries.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Debug,
{
    retry_with_sleeper(config, &TokioSleeper, operation).await
}

pub async fn retry_with_sleeper<F, Fut, T, E>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Debug,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(e) => e,
        };

        if attempts > config.max_retries || !error.is_retryable() {
            log::error!("Giving up after {} attempt(s): {:?}", attempts, error);
            return RetryResult {
                result: Err(error),
                attempts,
            };
        }

        let delay = error
            .retry_after()
            .unwrap_or_else(|| config.delay_for_attempt(attempts - 1));
        log::warn!(
            "Attempt {}/{} failed, retrying in {:?}: {:?}",
            attempts,
            config.max_retries + 1,
            delay,
            error
        );
        sleeper.sleep(delay).await;
    }
}
