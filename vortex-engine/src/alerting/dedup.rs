//! Deduplication and rate-limiting (§4.4): each `(topic, series-id)` may
//! emit on transition or, within the same level, at most once per a
//! configured rate-limit window. Modeled as a leaky bucket with capacity
//! 1: a full bucket permits one emission and then needs a full window to
//! refill.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct LeakyBucket {
    tokens: f64,
    last_update: i64,
}

impl LeakyBucket {
    fn full(now: i64) -> Self {
        Self {
            tokens: 1.0,
            last_update: now,
        }
    }

    fn try_consume(&mut self, now: i64, interval_ns: i64) -> bool {
        if interval_ns <= 0 {
            return true;
        }
        let elapsed = (now - self.last_update).max(0);
        let leaked = elapsed as f64 / interval_ns as f64;
        self.tokens = (self.tokens + leaked).min(1.0);
        self.last_update = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn reset_empty(&mut self, now: i64) {
        self.tokens = 0.0;
        self.last_update = now;
    }
}

/// Per-`(topic, series-id)` leaky-bucket rate limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    interval_ns: i64,
    buckets: HashMap<String, LeakyBucket>,
}

impl RateLimiter {
    pub fn new(interval_ns: i64) -> Self {
        Self {
            interval_ns,
            buckets: HashMap::new(),
        }
    }

    /// Called on a state transition: transitions always emit, and reset
    /// the bucket so the next non-transition emission waits a full window.
    pub fn record_transition(&mut self, key: &str, now: i64) {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| LeakyBucket::full(now))
            .reset_empty(now);
    }

    /// Called on a non-transition emission attempt; returns whether this
    /// emission is allowed under the rate limit.
    pub fn allow(&mut self, key: &str, now: i64) -> bool {
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| LeakyBucket::full(now));
        bucket.try_consume(now, self.interval_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1_000_000_000;

    #[test]
    fn first_emission_after_transition_waits_a_full_window() {
        let mut rl = RateLimiter::new(60 * SEC);
        rl.record_transition("s1", 0);
        assert!(!rl.allow("s1", 10 * SEC));
        assert!(rl.allow("s1", 60 * SEC));
    }

    #[test]
    fn allows_exactly_two_emissions_over_two_minutes_at_one_minute_rate() {
        let mut rl = RateLimiter::new(60 * SEC);
        rl.record_transition("s1", 0);
        let mut allowed = 1; // the transition itself
        // 100 points/sec for 2 minutes: 12000 samples covering [0, 120s).
        for step in 0..12_000i64 {
            let t = step * 10_000_000;
            if rl.allow("s1", t) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 2);
    }

    #[test]
    fn independent_series_have_independent_buckets() {
        let mut rl = RateLimiter::new(60 * SEC);
        rl.record_transition("a", 0);
        rl.record_transition("b", 0);
        assert!(!rl.allow("a", 1 * SEC));
        assert!(!rl.allow("b", 1 * SEC));
    }
}
