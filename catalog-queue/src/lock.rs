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

//! Per-key compute lock: a time-bounded map from coordinate string to an
//! "in progress" marker, giving per-coordinate mutual exclusion within
//! one process. Not a distributed lock — cross-process exclusion is
//! delegated to queue visibility timeouts.

use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TTL_SECS: u64 = 300;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ComputeLock {
    cache: Cache<String, bool>,
    contention_total: AtomicU64,
}

impl ComputeLock {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).build(),
            contention_total: AtomicU64::new(0),
        }
    }

    /// Number of poll iterations spent waiting for an already-held key,
    /// across the lock's lifetime. A proxy for compute-lock contention.
    pub fn contention_total(&self) -> u64 {
        self.contention_total.load(Ordering::Relaxed)
    }

    pub fn get(&self, key: &str) -> bool {
        self.cache.get(key).unwrap_or(false)
    }

    pub fn set(&self, key: &str) {
        self.cache.insert(key.to_string(), true);
    }

    pub fn delete(&self, key: &str) {
        self.cache.invalidate(key);
    }

    /// Poll-wait (fixed 500ms delay) while the key is held, then mark it
    /// held and return a guard that releases it on every exit path,
    /// success or failure.
    pub async fn acquire(&self, key: &str) -> ComputeLockGuard<'_> {
        while self.get(key) {
            self.contention_total.fetch_add(1, Ordering::Relaxed);
            debug!(key, "compute lock held, polling");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        self.set(key);
        ComputeLockGuard {
            lock: self,
            key: key.to_string(),
            released: false,
        }
    }
}

impl Default for ComputeLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the held key on drop (or on an explicit [`Self::release`]),
/// so a panic or an early `?` return inside the critical section never
/// leaves the coordinate locked past its TTL.
pub struct ComputeLockGuard<'a> {
    lock: &'a ComputeLock,
    key: String,
    released: bool,
}

impl ComputeLockGuard<'_> {
    pub fn release(mut self) {
        self.lock.delete(&self.key);
        self.released = true;
    }
}

impl Drop for ComputeLockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.lock.delete(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn acquire_blocks_until_released() {
        let lock = Arc::new(ComputeLock::with_ttl(Duration::from_secs(5)));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let lock = lock.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let guard = lock.acquire("npm/npmjs/-/test/1.0.0").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
                guard.release();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_releases_without_explicit_release_call() {
        let lock = ComputeLock::with_ttl(Duration::from_secs(5));
        {
            let _guard = lock.acquire("key").await;
            assert!(lock.get("key"));
        }
        assert!(!lock.get("key"));
    }
}
