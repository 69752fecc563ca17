//! Retry policy and failure classification
//!
//! Classification is a pure function from failure to retryability; the
//! executors consume it in one shared retry loop so the blocking and
//! async paths cannot diverge.

use std::time::Duration;

use backoff::ExponentialBackoff;

use crate::error::Error;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry attempts after the first; attempts run 0..=max_retries
    pub max_retries: u32,
    /// Base delay in seconds; attempt n waits retry_delay * multiplier^n
    pub retry_delay: f64,
    /// Cap on the delay between attempts, in seconds
    pub max_delay_secs: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to randomize delays to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: 1.0,
            max_delay_secs: 60,
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Create a fresh backoff sequence for one request execution
    pub fn create_backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_secs_f64(self.retry_delay.max(0.0));
        let mut backoff = ExponentialBackoff {
            // current_interval is what next_backoff hands out first
            current_interval: initial,
            initial_interval: initial,
            max_interval: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        if !self.jitter {
            backoff.randomization_factor = 0.0;
        }
        backoff
    }
}

/// Whether a failure may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Fatal,
}

impl Classification {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Classification::Retryable)
    }
}

/// Classify a failure, independent of the execution model
///
/// Transient transport failures are retryable; request-construction and
/// TLS verification failures propagate on first occurrence.
pub fn classify(error: &Error) -> Classification {
    match error {
        Error::Network { .. }
        | Error::Connection { .. }
        | Error::Timeout { .. }
        | Error::Proxy { .. } => Classification::Retryable,
        _ => Classification::Fatal,
    }
}
