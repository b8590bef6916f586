use moka::sync::Cache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on the number of clients tracked at once. Least recently
/// used windows are evicted past this.
const MAX_CLIENTS: u64 = 10_000;

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request limiter keyed by client identity. The caller passes
/// the current instant so windows can be driven deterministically.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    windows: Cache<String, Arc<Mutex<Window>>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self::with_capacity(max, window, MAX_CLIENTS)
    }

    fn with_capacity(max: u32, window: Duration, capacity: u64) -> Self {
        let windows = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(window)
            .build();

        RateLimiter {
            max,
            window,
            windows,
        }
    }

    /// Counts one request from `key`. Returns false once `key` has used up
    /// its allowance for the current window.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        let entry = self.windows.get_with_by_ref(key, || {
            Arc::new(Mutex::new(Window {
                started: now,
                count: 0,
            }))
        });
        let mut window = entry.lock();

        if now.saturating_duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max {
            return false;
        }
        window.count += 1;
        true
    }

    pub fn reset(&self) {
        self.windows.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_client() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check("a", now));
        assert!(limiter.check("a", now));
        assert!(!limiter.check("a", now));

        // other clients have their own window
        assert!(limiter.check("b", now));
    }

    #[test]
    fn test_window_expires() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check("a", now));
        assert!(!limiter.check("a", now + Duration::from_secs(59)));
        assert!(limiter.check("a", now + Duration::from_secs(60)));
        assert!(!limiter.check("a", now + Duration::from_secs(61)));
    }

    #[test]
    fn test_tracked_clients_bounded() {
        let limiter = RateLimiter::with_capacity(1, Duration::from_secs(600), 100);
        let now = Instant::now();

        for i in 0..5_000 {
            limiter.check(&format!("10.0.{}.{}", i / 256, i % 256), now);
        }
        limiter.windows.run_pending_tasks();

        assert!(limiter.windows.entry_count() <= 100);
    }

    #[test]
    fn test_reset() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check("a", now));
        assert!(!limiter.check("a", now));
        limiter.reset();
        assert!(limiter.check("a", now));
    }
}
