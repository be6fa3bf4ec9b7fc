//! Retry - Bounded backoff against transient service failures
//!
//! The service sheds load with 429s and the occasional 5xx. Attempts are
//! bounded, delays grow exponentially with jitter, and an explicit
//! `Retry-After` hint from the server overrides the computed delay outright.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, ErrorRecord, Result};

/// Attempts made before giving up, counting the first request.
pub const MAX_ATTEMPTS: u32 = 10;

/// Seed for the growing backoff delay.
pub const INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Multiplier applied to the delay on every retry, before jitter.
pub const BACKOFF_BASE: f64 = 2.0;

/// Outcome of a single request attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The attempt produced a usable response.
    Success(T),
    /// Transient condition; eligible for another attempt.
    Retry {
        status: u16,
        /// Server-provided wait, used verbatim when present. Zero means the
        /// next attempt may fire immediately.
        retry_after: Option<Duration>,
    },
    /// Non-transient failure; surfaced without further attempts.
    Fatal(ErrorRecord),
}

/// Backoff configuration shared by every request the client sends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_delay: INITIAL_DELAY,
            backoff_base: BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Drive `attempt` until it succeeds, fails fatally, or the attempt
    /// budget runs out. Exhaustion reports as a rate-limit error, since a
    /// persistent transient condition is exactly what that kind describes.
    ///
    /// Errors returned by `attempt` itself (transport failures and the like)
    /// are not transient conditions and short-circuit immediately.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        let mut delay = self.initial_delay.as_secs_f64();
        let mut attempt_no: u32 = 0;
        loop {
            attempt_no += 1;
            match attempt().await? {
                Attempt::Success(value) => return Ok(value),
                Attempt::Fatal(record) => {
                    debug!("attempt {attempt_no} failed fatally: {}", record.message);
                    return Err(Error::Api(record));
                }
                Attempt::Retry {
                    status,
                    retry_after,
                } => {
                    if attempt_no >= self.max_attempts {
                        warn!("giving up after {attempt_no} attempts (last status {status})");
                        return Err(Error::Api(ErrorRecord::rate_limited()));
                    }
                    let wait = match retry_after {
                        Some(hint) => hint,
                        None => {
                            delay *= self.backoff_base * (1.0 + rand::random::<f64>());
                            Duration::from_secs_f64(delay)
                        }
                    };
                    debug!("attempt {attempt_no} got status {status}; retrying in {wait:?}");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
