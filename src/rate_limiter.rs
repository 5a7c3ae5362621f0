//! Fixed-window request gate.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Permits at most `max` acquisitions per window; callers over the limit sleep
/// until the window ends and retry.
#[derive(Debug)]
pub struct RateLimiter {
    max: u64,
    window: Duration,
    count: AtomicU64,
    window_end: Mutex<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max: u64, window: Duration) -> Self {
        Self {
            max: max.max(1),
            window,
            count: AtomicU64::new(0),
            window_end: Mutex::new(Instant::now() + window),
        }
    }

    #[must_use]
    pub fn per_second(max: u64) -> Self {
        Self::new(max, Duration::from_secs(1))
    }

    /// Wait for a slot in the current or a later window.
    pub async fn acquire(&self) {
        loop {
            let end = self.roll_window();
            if self.count.fetch_add(1, Ordering::SeqCst) < self.max {
                return;
            }
            tokio::time::sleep_until(end).await;
        }
    }

    /// Reset the counter once the current window has passed; returns the window end.
    fn roll_window(&self) -> Instant {
        let mut end = self
            .window_end
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        if now >= *end {
            self.count.store(0, Ordering::SeqCst);
            *end = now + self.window;
        }
        *end
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn excess_callers_wait_for_the_next_window() {
        let limiter = RateLimiter::new(3, Duration::from_millis(100));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn permits_stay_within_window_bound() {
        let window = Duration::from_millis(50);
        let limiter = Arc::new(RateLimiter::new(2, window));
        let start = Instant::now();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            tasks.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut stamps = Vec::new();
        for task in tasks {
            stamps.push(task.await.unwrap());
        }
        // k windows admit at most (k + 1) * max callers
        for k in 1..=4u32 {
            let admitted = stamps.iter().filter(|t| **t - start < window * k).count();
            assert!(admitted <= ((k + 1) * 2) as usize);
        }
        assert!(stamps.iter().all(|t| *t - start < window * 20));
    }
}
