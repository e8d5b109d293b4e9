//! Engine-wide fetch rate limiting.
//!
//! A single token bucket shared by every fetch task in one engine run,
//! replenishing at `max_scans_per_minute / 60` tokens per second. Refill
//! only advances the clock by the time that actually produced tokens, so
//! fractional accumulation is never discarded at low rates.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Decision for one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitDecision {
    Allow,
    /// Wait at least this long before retrying.
    Deny { retry_after: Duration },
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct ScanRateLimiter {
    state: Mutex<BucketState>,
    rate_per_sec: f64,
    max_tokens: f64,
}

impl ScanRateLimiter {
    /// Bucket for the given per-minute budget. Burst is one second's worth
    /// of tokens with a floor of one, so low limits still make progress.
    #[must_use]
    pub fn new(max_scans_per_minute: u32) -> Self {
        let rate_per_sec = f64::from(max_scans_per_minute) / 60.0;
        let max_tokens = rate_per_sec.max(1.0);
        Self {
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
            rate_per_sec,
            max_tokens,
        }
    }

    /// Try to take one token.
    pub async fn try_consume(&self) -> RateLimitDecision {
        let mut state = self.state.lock().await;

        let elapsed = state.last_refill.elapsed().as_secs_f64();
        let earned = elapsed * self.rate_per_sec;
        if earned > 0.0 {
            state.tokens = (state.tokens + earned).min(self.max_tokens);
            // Only credit the time that produced the earned tokens.
            state.last_refill += Duration::from_secs_f64(earned / self.rate_per_sec);
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            RateLimitDecision::Allow
        } else {
            let deficit = 1.0 - state.tokens;
            let wait_secs = if self.rate_per_sec > 0.0 {
                deficit / self.rate_per_sec
            } else {
                1.0
            };
            RateLimitDecision::Deny {
                retry_after: Duration::from_secs_f64(wait_secs),
            }
        }
    }

    /// Take one token, sleeping as long as the bucket demands.
    pub async fn acquire(&self) {
        loop {
            match self.try_consume().await {
                RateLimitDecision::Allow => return,
                RateLimitDecision::Deny { retry_after } => {
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }
}
