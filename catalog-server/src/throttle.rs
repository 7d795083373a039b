// Copyright 2025 Catalog Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Throttle for `POST /harvest` (spec §6.1: "422 when the throttler
//! rejects every entry"). A token bucket per tool, scaled-integer atomics
//! so `try_consume` never takes a lock, the way
//! `agentreplay-server::auth::rate_limit::TokenBucket` is built.

use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TokenBucket {
    tokens: AtomicU64,
    capacity: f64,
    refill_rate: f64,
    last_refill_ms: AtomicU64,
    start: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, window: Duration) -> Self {
        let refill_rate = capacity as f64 / window.as_secs_f64();
        Self {
            tokens: AtomicU64::new((capacity as u64) * 1000),
            capacity: capacity as f64,
            refill_rate,
            last_refill_ms: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    fn get(&self) -> f64 {
        self.tokens.load(Ordering::Relaxed) as f64 / 1000.0
    }

    fn set(&self, value: f64) {
        self.tokens.store((value * 1000.0) as u64, Ordering::Relaxed);
    }

    fn refill(&self) {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let last_ms = self.last_refill_ms.swap(now_ms, Ordering::Relaxed);
        let elapsed_secs = now_ms.saturating_sub(last_ms) as f64 / 1000.0;
        let current = self.get();
        self.set((current + elapsed_secs * self.refill_rate).min(self.capacity));
    }

    fn try_consume(&self) -> bool {
        self.refill();
        let current = self.get();
        if current >= 1.0 {
            self.set(current - 1.0);
            true
        } else {
            false
        }
    }
}

/// One bucket per tool name, so a noisy tool cannot starve others out of
/// the shared `/harvest` endpoint.
pub struct HarvestThrottle {
    capacity: u32,
    window: Duration,
    buckets: Cache<String, Arc<TokenBucket>>,
}

impl HarvestThrottle {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: Cache::builder().max_capacity(10_000).time_to_idle(window * 10).build(),
        }
    }

    /// `true` if the request for `tool` may proceed.
    pub fn try_acquire(&self, tool: &str) -> bool {
        let capacity = self.capacity;
        let window = self.window;
        let bucket = self.buckets.get_with(tool.to_string(), || Arc::new(TokenBucket::new(capacity, window)));
        bucket.try_consume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_capacity_then_rejects() {
        let throttle = HarvestThrottle::new(3, Duration::from_secs(60));
        assert!(throttle.try_acquire("scancode"));
        assert!(throttle.try_acquire("scancode"));
        assert!(throttle.try_acquire("scancode"));
        assert!(!throttle.try_acquire("scancode"));
    }

    #[test]
    fn buckets_are_independent_per_tool() {
        let throttle = HarvestThrottle::new(1, Duration::from_secs(60));
        assert!(throttle.try_acquire("scancode"));
        assert!(throttle.try_acquire("licensee"));
    }
}
