use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::bucket::{refill_rate_for, Decision, TokenBucket};
use crate::config::RateLimitConfig;

/// Fraction of `max_clients` dropped at once when the registry is full.
const OVERFLOW_EVICTION_DIVISOR: usize = 16;

/// Owns one [`TokenBucket`] per client key.
///
/// The map is sharded, so clients hashing to different shards never share a
/// lock, and each bucket serializes only its own admission checks.
/// Fetch-or-create goes through the shard's entry lock, which guarantees a
/// single bucket per key however many requests race on a new client.
///
/// `max_clients` is a soft bound: concurrent inserts of new keys may overshoot
/// it briefly until the next insert makes room.
pub struct LimiterRegistry {
    buckets: DashMap<String, Arc<TokenBucket>, RandomState>,
    capacity: u32,
    refill_rate: f64,
    max_clients: usize,
    idle_ttl: Duration,
    created_total: AtomicU64,
}

impl LimiterRegistry {
    /// # Arguments
    /// * `capacity` - burst size of every bucket
    /// * `window` - time for an empty bucket to refill completely
    /// * `max_clients` - bound on tracked keys
    /// * `idle_ttl` - buckets untouched this long may be evicted
    pub fn new(capacity: u32, window: Duration, max_clients: usize, idle_ttl: Duration) -> Self {
        Self {
            buckets: DashMap::with_hasher(RandomState::new()),
            capacity,
            refill_rate: refill_rate_for(capacity, window),
            max_clients: max_clients.max(1),
            idle_ttl,
            created_total: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.window(), config.max_clients, config.idle_ttl())
    }

    /// Existing bucket for `key`, or a new full one.
    pub fn bucket_for(&self, key: &str) -> Arc<TokenBucket> {
        self.bucket_for_at(key, Instant::now())
    }

    pub fn bucket_for_at(&self, key: &str, now: Instant) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        if self.buckets.len() >= self.max_clients {
            self.make_room(now);
        }

        let bucket = self.buckets.entry(key.to_string()).or_insert_with(|| {
            self.created_total.fetch_add(1, Ordering::Relaxed);
            Arc::new(TokenBucket::new_at(self.capacity, self.refill_rate, now))
        });
        Arc::clone(bucket.value())
    }

    /// Spend one token from `key`'s bucket.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// The spend happens while the map entry is still locked, so a
    /// concurrent sweep cannot drop the bucket between lookup and spend.
    /// Once spent, `last_refill` is `now` and the bucket is no longer idle.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.allow_at(1.0, now);
        }

        if self.buckets.len() >= self.max_clients {
            self.make_room(now);
        }

        let bucket = self.buckets.entry(key.to_string()).or_insert_with(|| {
            self.created_total.fetch_add(1, Ordering::Relaxed);
            Arc::new(TokenBucket::new_at(self.capacity, self.refill_rate, now))
        });
        bucket.allow_at(1.0, now)
    }

    /// Drop buckets idle for at least `idle_ttl`. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill()) < self.idle_ttl);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, tracked = self.buckets.len(), "evicted idle rate limit buckets");
        }
        removed
    }

    /// Called when a new key would exceed `max_clients`: expire idle buckets
    /// first, then drop the least recently used batch.
    fn make_room(&self, now: Instant) {
        if self.evict_idle_at(now) > 0 && self.buckets.len() < self.max_clients {
            return;
        }

        let batch = (self.max_clients / OVERFLOW_EVICTION_DIVISOR).max(1);
        let mut by_age: Vec<(Instant, String)> = self
            .buckets
            .iter()
            .map(|entry| (entry.value().last_refill(), entry.key().clone()))
            .collect();
        if by_age.is_empty() {
            return;
        }
        let batch = batch.min(by_age.len());
        if batch < by_age.len() {
            by_age.select_nth_unstable_by_key(batch, |(seen, _)| *seen);
        }

        let mut removed = 0usize;
        for (seen, key) in by_age.into_iter().take(batch) {
            // skip buckets that were used while we were scanning
            if self
                .buckets
                .remove_if(&key, |_, bucket| bucket.last_refill() <= seen)
                .is_some()
            {
                removed = removed.saturating_add(1);
            }
        }
        debug!(removed, max_clients = self.max_clients, "rate limit registry full, evicted stalest buckets");
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of buckets ever created, including evicted ones.
    pub fn created_total(&self) -> u64 {
        self.created_total.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }
}
