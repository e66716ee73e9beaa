use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Sliding-window rate limiter for Last.fm API calls
///
/// Last.fm allows 5 requests per second per API key.
pub struct RateLimiter {
    requests: Mutex<VecDeque<Instant>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter with Last.fm's default limit
    pub fn new() -> Self {
        Self::with_limit(5, Duration::from_secs(1))
    }

    pub fn with_limit(limit: usize, window: Duration) -> Self {
        Self {
            requests: Mutex::new(VecDeque::with_capacity(limit)),
            limit: limit.max(1),
            window,
        }
    }

    /// Wait if needed to respect the limit, then record the request
    pub async fn wait_if_needed(&self) {
        // Held across the sleep so waiters are served in order
        let mut requests = self.requests.lock().await;

        let now = Instant::now();
        while requests
            .front()
            .is_some_and(|&sent| now.duration_since(sent) >= self.window)
        {
            requests.pop_front();
        }

        if requests.len() >= self.limit {
            if let Some(&oldest) = requests.front() {
                sleep_until(oldest + self.window).await;
                requests.pop_front();
            }
        }

        requests.push_back(Instant::now());
    }

    /// Requests recorded in the current window
    pub async fn request_count(&self) -> usize {
        let requests = self.requests.lock().await;
        let now = Instant::now();
        requests
            .iter()
            .filter(|&&sent| now.duration_since(sent) < self.window)
            .count()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_allows_requests() {
        let limiter = RateLimiter::new();

        let start = Instant::now();
        limiter.wait_if_needed().await;

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.request_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_enforces_per_second_limit() {
        let limiter = RateLimiter::new();

        for _ in 0..5 {
            limiter.wait_if_needed().await;
        }

        // 6th request waits for the window to slide
        let start = Instant::now();
        limiter.wait_if_needed().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_forgets_old_requests() {
        let limiter = RateLimiter::with_limit(2, Duration::from_secs(1));
        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(limiter.request_count().await, 0);
        let start = Instant::now();
        limiter.wait_if_needed().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
