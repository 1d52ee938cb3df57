// src/cache.rs
// Request-result TTL cache and per-bucket rate limiting for outbound calls

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// TTL cache keyed by request identity.
///
/// Policy is TTL plus a max entry count. When an insert pushes the cache past
/// `max_entries`, the oldest tenth (at least one) is dropped.
pub struct TtlCache<V> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Lookup against an explicit clock; expired entries are removed.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let (inserted, value) = entries.get(key)?;
        if now.saturating_duration_since(*inserted) > self.ttl {
            entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: impl Into<String>, value: V, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), (now, value));

        if entries.len() > self.max_entries {
            let drop_count = (self.max_entries / 10).max(1);
            let mut by_age: Vec<(Instant, String)> = entries
                .iter()
                .map(|(k, (at, _))| (*at, k.clone()))
                .collect();
            by_age.sort();
            for (_, key) in by_age.into_iter().take(drop_count) {
                entries.remove(&key);
            }
            debug!(dropped = drop_count, remaining = entries.len(), "Cache evicted oldest entries");
        }
    }

    /// Unexpired values, in no particular order.
    pub fn values(&self) -> Vec<V> {
        self.values_at(Instant::now())
    }

    pub fn values_at(&self, now: Instant) -> Vec<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .filter(|(inserted, _)| now.saturating_duration_since(*inserted) <= self.ttl)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

/// Minimum spacing between outbound calls in the same bucket.
///
/// Callers reserve the next free slot under the lock and sleep outside it,
/// so concurrent callers end up spaced at least `min_interval` apart.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until this bucket may issue another request.
    pub async fn acquire(&self, bucket: &str) {
        if self.min_interval.is_zero() {
            return;
        }
        let slot = self.reserve(bucket, Instant::now());
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(bucket, wait_ms = wait.as_millis() as u64, "Rate limit wait");
            tokio::time::sleep(wait).await;
        }
    }

    /// Reserve the next slot for `bucket` and return when it starts.
    fn reserve(&self, bucket: &str, now: Instant) -> Instant {
        let mut slots = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
        let slot = match slots.get(bucket) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        slots.insert(bucket.to_string(), slot + self.min_interval);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // TtlCache
    // ============================================================================

    #[test]
    fn test_cache_hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(30), 10);
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);
        assert_eq!(cache.get_at("a", t0 + Duration::from_secs(29)), Some(1));
    }

    #[test]
    fn test_cache_expired_entry_removed() {
        let cache = TtlCache::new(Duration::from_secs(30), 10);
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);
        assert_eq!(cache.get_at("a", t0 + Duration::from_secs(31)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_evicts_oldest_tenth() {
        let cache = TtlCache::new(Duration::from_secs(300), 20);
        let t0 = Instant::now();
        for i in 0..21 {
            cache.insert_at(format!("k{i}"), i, t0 + Duration::from_millis(i as u64));
        }
        // 21 > 20, so 20 / 10 = 2 oldest entries go
        assert_eq!(cache.len(), 19);
        let now = t0 + Duration::from_secs(1);
        assert_eq!(cache.get_at("k0", now), None);
        assert_eq!(cache.get_at("k1", now), None);
        assert_eq!(cache.get_at("k2", now), Some(2));
        assert_eq!(cache.get_at("k20", now), Some(20));
    }

    #[test]
    fn test_cache_small_max_drops_at_least_one() {
        let cache = TtlCache::new(Duration::from_secs(300), 3);
        let t0 = Instant::now();
        for i in 0..4 {
            cache.insert_at(format!("k{i}"), i, t0 + Duration::from_millis(i as u64));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get_at("k0", t0), None);
    }

    #[test]
    fn test_cache_overwrite_refreshes_timestamp() {
        let cache = TtlCache::new(Duration::from_secs(10), 5);
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);
        cache.insert_at("a", 2, t0 + Duration::from_secs(8));
        assert_eq!(cache.get_at("a", t0 + Duration::from_secs(15)), Some(2));
    }

    #[test]
    fn test_values_skip_expired_entries() {
        let cache = TtlCache::new(Duration::from_secs(10), 5);
        let t0 = Instant::now();
        cache.insert_at("old", 1, t0);
        cache.insert_at("new", 2, t0 + Duration::from_secs(8));
        assert_eq!(cache.values_at(t0 + Duration::from_secs(12)), vec![2]);
    }

    // ============================================================================
    // RateLimiter
    // ============================================================================

    #[test]
    fn test_reserve_spaces_slots() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let t0 = Instant::now();
        let first = limiter.reserve("zotero", t0);
        let second = limiter.reserve("zotero", t0);
        let third = limiter.reserve("zotero", t0);
        assert_eq!(first, t0);
        assert_eq!(second, t0 + Duration::from_millis(200));
        assert_eq!(third, t0 + Duration::from_millis(400));
    }

    #[test]
    fn test_reserve_buckets_are_independent() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let t0 = Instant::now();
        limiter.reserve("zotero", t0);
        assert_eq!(limiter.reserve("styles", t0), t0);
    }

    #[test]
    fn test_reserve_after_idle_starts_now() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let t0 = Instant::now();
        limiter.reserve("zotero", t0);
        let later = t0 + Duration::from_secs(5);
        assert_eq!(limiter.reserve("zotero", later), later);
    }

    #[tokio::test]
    async fn test_acquire_waits_between_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(60));
        let start = Instant::now();
        limiter.acquire("zotero").await;
        limiter.acquire("zotero").await;
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[tokio::test]
    async fn test_acquire_zero_interval_is_immediate() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("zotero").await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
