//! Fixed-window rate limiter for batch jobs.

use crate::config::RateLimitConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// At most `max_operations` per `window`. Owned by a single runner and
/// passed by `&mut`, never shared.
#[derive(Debug)]
pub struct RateLimiter {
    max_operations: u32,
    window: Duration,
    window_start: Instant,
    processed: u32,
}

impl RateLimiter {
    pub fn new(max_operations: u32, window: Duration) -> Self {
        Self {
            max_operations: max_operations.max(1),
            window,
            window_start: Instant::now(),
            processed: 0,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_operations, config.window())
    }

    /// Wait until another operation may run. Sleeps for the rest of the
    /// window once the cap is reached, then starts a fresh window.
    pub async fn acquire(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window {
            self.reset();
            return;
        }
        if self.processed >= self.max_operations {
            let wait = self.window - elapsed;
            info!(
                processed = self.processed,
                wait_ms = wait.as_millis() as u64,
                "rate limit reached, waiting for window reset"
            );
            tokio::time::sleep(wait).await;
            self.reset();
        }
    }

    /// Count one attempted operation, successful or not.
    pub fn record(&mut self) {
        self.processed += 1;
    }

    pub fn processed(&self) -> u32 {
        self.processed
    }

    fn reset(&mut self) {
        self.window_start = Instant::now();
        self.processed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn operations_within_cap_do_not_wait() {
        let mut limiter = RateLimiter::new(500, Duration::from_millis(60_000));
        let start = Instant::now();
        for _ in 0..500 {
            limiter.acquire().await;
            limiter.record();
        }
        assert_eq!(limiter.processed(), 500);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_past_cap_waits_for_window_reset() {
        let mut limiter = RateLimiter::new(500, Duration::from_millis(60_000));
        let start = Instant::now();
        for _ in 0..500 {
            limiter.acquire().await;
            limiter.record();
        }
        tokio::time::advance(Duration::from_millis(10_000)).await;

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(60_000));
        assert_eq!(limiter.processed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_window_resets_without_waiting() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        limiter.record();
        limiter.record();
        tokio::time::advance(Duration::from_secs(2)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(limiter.processed(), 0);
    }
}
