//! Fixed-window request limiter, one per connection.

use std::time::{Duration, Instant};

/// Counts requests in fixed windows and rejects those over the limit.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` per `window`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Records a request now; returns `false` if it exceeds the limit.
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    /// Records a request at `now`; returns `false` if it exceeds the limit.
    pub fn check_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.max_requests {
            return false;
        }
        self.count += 1;
        true
    }
}
