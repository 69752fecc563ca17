//! Token-bucket admission control
//!
//! One limiter is shared across every request issued through a client.
//! Both acquisition paths loop over the same poll: concurrently-woken
//! callers race for refilled tokens, so a failed poll must re-enter the
//! refill/check cycle rather than assume its wait bought it a token.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Snapshot of limiter state for observability
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub requests_per_second: f64,
    pub current_rate: f64,
    pub available_tokens: f64,
    pub window_size: u64,
    pub requests_in_window: usize,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    /// Admission timestamps within the trailing window; reporting only
    admissions: VecDeque<Instant>,
}

impl BucketState {
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }

    fn trim_window(&mut self, window: Duration) {
        let Some(cutoff) = Instant::now().checked_sub(window) else {
            return;
        };
        while self.admissions.front().is_some_and(|t| *t < cutoff) {
            self.admissions.pop_front();
        }
    }
}

/// Token-bucket rate limiter with blocking and suspending acquisition
///
/// Safe for concurrent use; the mutex is held only for bookkeeping, never
/// across a wait.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_second: f64,
    max_tokens: f64,
    window: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a limiter from a validated configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            requests_per_second: config.requests_per_second,
            max_tokens: config.requests_per_second,
            window: Duration::from_secs(config.window_size),
            state: Mutex::new(BucketState {
                tokens: config.requests_per_second,
                last_refill: Instant::now(),
                admissions: VecDeque::new(),
            }),
        }
    }

    /// Deduct `cost` tokens, or report how long to wait before re-polling
    fn poll(&self, cost: f64) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock().unwrap();
        state.refill(self.requests_per_second, self.max_tokens);
        if state.tokens >= cost {
            state.tokens -= cost;
            state.admissions.push_back(Instant::now());
            state.trim_window(self.window);
            Ok(())
        } else {
            Err(Duration::from_secs_f64(
                (cost - state.tokens) / self.requests_per_second,
            ))
        }
    }

    /// Block the calling thread until `cost` tokens are available, then
    /// deduct them
    pub fn acquire(&self, cost: u32) {
        loop {
            match self.poll(cost as f64) {
                Ok(()) => return,
                Err(wait) => {
                    log::debug!("rate limit hit, waiting {:.3}s", wait.as_secs_f64());
                    std::thread::sleep(wait);
                }
            }
        }
    }

    /// Suspend the calling task until `cost` tokens are available, then
    /// deduct them
    ///
    /// Cancellation-safe: tokens are deducted only at the success point
    /// under the lock, so a future dropped mid-wait has spent nothing.
    pub async fn acquire_async(&self, cost: u32) {
        loop {
            match self.poll(cost as f64) {
                Ok(()) => return,
                Err(wait) => {
                    log::debug!("rate limit hit, waiting {:.3}s", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Admissions per second over the trailing window; reporting only,
    /// never used for enforcement
    pub fn current_rate(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        state.trim_window(self.window);
        state.admissions.len() as f64 / self.window.as_secs_f64()
    }

    /// Tokens available right now
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        state.refill(self.requests_per_second, self.max_tokens);
        state.tokens
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut state = self.state.lock().unwrap();
        state.refill(self.requests_per_second, self.max_tokens);
        state.trim_window(self.window);
        RateLimiterStats {
            requests_per_second: self.requests_per_second,
            current_rate: state.admissions.len() as f64 / self.window.as_secs_f64(),
            available_tokens: state.tokens,
            window_size: self.window.as_secs(),
            requests_in_window: state.admissions.len(),
        }
    }
}
