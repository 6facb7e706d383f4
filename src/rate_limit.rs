use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::SharedClock;

const WINDOW_SECS: i64 = 60;

/// Outcome of a single `check`, surfaced to clients as `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: i64,
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    window: i64,
}

/// Fixed one-minute window counter per client (pod local).
///
/// Advisory only: it reports how much of the budget is left but never
/// refuses a request. Each key's read-modify-write happens under the
/// DashMap shard lock held by the entry guard, so concurrent checks for the
/// same client are linearizable.
#[derive(Clone)]
pub struct WindowRateLimiter {
    store: Arc<DashMap<String, WindowCounter>>,
    limit: u64,
    clock: SharedClock,
}

impl WindowRateLimiter {
    pub fn new(limit: u64, clock: SharedClock) -> Self {
        Self { store: Arc::new(DashMap::new()), limit, clock }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn check(&self, key: &str) -> RateLimitStatus {
        let window = self.clock.now_unix().div_euclid(WINDOW_SECS);
        let count = {
            let mut entry = self
                .store
                .entry(key.to_string())
                .or_insert(WindowCounter { count: 0, window });
            // stale windows are discarded, including a clock that stepped back
            if entry.window != window {
                entry.count = 0;
                entry.window = window;
            }
            entry.count = entry.count.saturating_add(1);
            entry.count
        };
        RateLimitStatus {
            limit: self.limit,
            remaining: self.limit.saturating_sub(count),
            reset_at: (window + 1) * WINDOW_SECS,
        }
    }

    /// Number of distinct clients seen since start.
    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const T0: i64 = 1_700_000_020; // 20s before a minute boundary

    fn limiter(limit: u64) -> (WindowRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        (WindowRateLimiter::new(limit, clock.clone()), clock)
    }

    #[test]
    fn remaining_decreases_then_clamps_at_zero() {
        let (rl, _) = limiter(3);
        let seen: Vec<u64> = (0..5).map(|_| rl.check("10.0.0.1").remaining).collect();
        assert_eq!(seen, vec![2, 1, 0, 0, 0]);
    }

    #[test]
    fn reset_is_next_minute_boundary() {
        let (rl, _) = limiter(60);
        let st = rl.check("a");
        assert_eq!(st.reset_at, (T0 / 60 + 1) * 60);
        assert_eq!(st.limit, 60);
    }

    #[test]
    fn clients_are_isolated() {
        let (rl, _) = limiter(5);
        for _ in 0..4 { rl.check("a"); }
        assert_eq!(rl.check("b").remaining, 4);
        assert_eq!(rl.check("a").remaining, 0);
        assert_eq!(rl.tracked_clients(), 2);
    }

    #[test]
    fn rollover_resets_count() {
        let (rl, clock) = limiter(10);
        for _ in 0..10 { rl.check("a"); }
        assert_eq!(rl.check("a").remaining, 0);
        clock.advance(20);
        let st = rl.check("a");
        assert_eq!(st.remaining, 9);
        assert_eq!(st.reset_at, (T0 / 60 + 2) * 60);
    }

    #[test]
    fn clock_going_backwards_does_not_underflow() {
        let (rl, clock) = limiter(2);
        for _ in 0..5 { rl.check("a"); }
        clock.advance(-3600);
        let st = rl.check("a");
        assert_eq!(st.remaining, 1);
    }

    #[test]
    fn concurrent_checks_count_every_request() {
        let (rl, _) = limiter(1_000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 { rl.check("shared"); }
                })
            })
            .collect();
        for h in handles { h.join().unwrap(); }
        assert_eq!(rl.check("shared").remaining, 1_000 - 401);
    }
}
