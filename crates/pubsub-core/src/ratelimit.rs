//! Bus-local token-bucket rate limiter.

use std::time::Instant;

/// Token bucket over a monotonic clock.
///
/// The clock is injectable (`Fn() -> Instant`, defaulting to
/// `Instant::now`) so tests can drive refills deterministically without
/// sleeping — the same parameterize-time-for-reproducibility approach the
/// fuzz/proptest harnesses elsewhere in this crate rely on.
pub struct RateLimiter {
    max_burst: f64,
    tokens_per_second: f64,
    tokens: f64,
    last_refill: Instant,
    clock: Box<dyn Fn() -> Instant>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_burst", &self.max_burst)
            .field("tokens_per_second", &self.tokens_per_second)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_per_second: f64, max_burst: f64) -> Self {
        Self::with_clock(max_per_second, max_burst, Instant::now)
    }

    pub fn with_clock<F>(max_per_second: f64, max_burst: f64, clock: F) -> Self
    where
        F: Fn() -> Instant + 'static,
    {
        let now = clock();
        Self {
            max_burst,
            tokens_per_second: max_per_second,
            tokens: max_burst,
            last_refill: now,
            clock: Box::new(clock),
        }
    }

    fn refill(&mut self) {
        let now = (self.clock)();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.tokens_per_second).min(self.max_burst);
        self.last_refill = now;
    }

    /// Attempts to consume one token. Returns `true` if one was
    /// available, `false` on exhaustion.
    pub fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        rc::Rc,
        time::{Duration, Instant},
    };

    use rstest::rstest;

    use super::*;

    fn fake_clock(advance_by: Rc<Cell<Duration>>) -> impl Fn() -> Instant {
        let start = Instant::now();
        move || start + advance_by.get()
    }

    #[rstest]
    fn test_burst_capacity_boundary() {
        let advance = Rc::new(Cell::new(Duration::ZERO));
        let mut limiter = RateLimiter::with_clock(1.0, 1.0, fake_clock(advance));
        assert!(limiter.try_consume());
        assert!(!limiter.try_consume());
    }

    #[rstest]
    fn test_refill_over_time() {
        let advance = Rc::new(Cell::new(Duration::ZERO));
        let mut limiter = RateLimiter::with_clock(10.0, 1.0, fake_clock(advance.clone()));
        assert!(limiter.try_consume());
        assert!(!limiter.try_consume());

        advance.set(Duration::from_millis(200));
        assert!(limiter.try_consume());
    }

    #[rstest]
    fn test_refill_clamped_to_max_burst() {
        let advance = Rc::new(Cell::new(Duration::ZERO));
        let mut limiter = RateLimiter::with_clock(100.0, 2.0, fake_clock(advance.clone()));
        advance.set(Duration::from_secs(10));
        assert!(limiter.try_consume());
        assert!(limiter.try_consume());
        assert!(!limiter.try_consume());
    }
}
