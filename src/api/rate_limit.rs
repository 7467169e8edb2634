// Fixed-window per-user rate limiting for the chat ingress.

use std::time::{Duration, Instant};

use dashmap::DashMap;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    counters: DashMap<String, (Instant, u32)>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            counters: DashMap::new(),
        }
    }

    /// Record one request for `user_id`. Returns false once the user has
    /// exhausted the current window. A limit of zero disables limiting.
    pub fn allow(&self, user_id: &str) -> bool {
        if self.per_minute == 0 {
            return true;
        }
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(user_id.to_string())
            .or_insert((now, 0));
        let (window_start, count) = *entry;
        if now.duration_since(window_start) >= WINDOW {
            *entry = (now, 1);
            return true;
        }
        if count >= self.per_minute {
            return false;
        }
        *entry = (window_start, count + 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_the_window_budget() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow("u1"));
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));
        // Other users have their own window.
        assert!(limiter.allow("u2"));
    }

    #[test]
    fn zero_disables_limiting() {
        let limiter = RateLimiter::new(0);
        for _ in 0..1000 {
            assert!(limiter.allow("u1"));
        }
    }
}
