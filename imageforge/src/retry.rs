//! Exponential backoff retry with jitter.
//!
//! Wraps a flaky async operation and re-runs it on failure, sleeping
//! `base_delay * attempt^backoff * jitter` between attempts. The jitter
//! factor is drawn from a configurable band so that many callers failing
//! at once do not retry in lockstep.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default number of attempts (the first try plus four retries).
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Backoff parameters shared by retry call sites.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub attempts: u32,
    /// Base delay multiplied by the backoff curve.
    pub base_delay: Duration,
    /// Exponent applied to the attempt index.
    pub backoff: f64,
    /// Jitter band `(low, high)`; the delay is scaled by a random factor
    /// drawn from this range.
    pub jitter: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff: 2.0,
            jitter: (0.5, 1.5),
        }
    }
}

impl RetryPolicy {
    /// Computes the sleep before the retry following failed `attempt`
    /// (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let curve = f64::from(attempt).powf(self.backoff);
        let (low, high) = self.jitter;
        let jitter = if low < high {
            rand::thread_rng().gen_range(low..high)
        } else {
            low
        };
        self.base_delay.mul_f64(curve * jitter)
    }
}

/// Retry wrapper around a zero-argument async operation.
///
/// `should_retry` can veto further attempts (cancellation must not be
/// retried); the observers are invoked for telemetry only and never
/// alter control flow. Terminal failure propagates the original error.
pub struct Retry<E> {
    policy: RetryPolicy,
    should_retry: Box<dyn Fn(&E) -> bool + Send + Sync>,
    on_attempt_failure: Option<Box<dyn Fn(&E, u32) + Send + Sync>>,
    on_failure: Option<Box<dyn Fn(&E, u32) + Send + Sync>>,
}

impl<E> Retry<E> {
    /// Creates a retry wrapper that retries every error under `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            should_retry: Box::new(|_| true),
            on_attempt_failure: None,
            on_failure: None,
        }
    }

    /// Sets a predicate that can veto further attempts for an error.
    pub fn with_should_retry(
        mut self,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Box::new(predicate);
        self
    }

    /// Observes every failed attempt with its 1-based index.
    pub fn with_on_attempt_failure(
        mut self,
        observer: impl Fn(&E, u32) + Send + Sync + 'static,
    ) -> Self {
        self.on_attempt_failure = Some(Box::new(observer));
        self
    }

    /// Observes the terminal failure with the final attempt index.
    pub fn with_on_failure(mut self, observer: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Box::new(observer));
        self
    }

    /// Runs `operation` until it succeeds, the attempts are exhausted, or
    /// `should_retry` vetoes.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if let Some(observer) = &self.on_attempt_failure {
                        observer(&error, attempt);
                    }

                    if attempt >= attempts || !(self.should_retry)(&error) {
                        if let Some(observer) = &self.on_failure {
                            observer(&error, attempt);
                        }
                        return Err(error);
                    }

                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
