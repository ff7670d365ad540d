// =============================================================================
// Response Cache — LRU + hand-tracked TTL over a coarse request fingerprint
// =============================================================================
//
// The `lru` crate has no notion of expiry, so each entry carries the
// `Instant` it was inserted at and callers check that against the
// configured TTL on lookup, discarding stale hits. Locking uses the same
// `parking_lot::Mutex` convention as the rest of the engine's shared state.
// =============================================================================

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::Direction;

/// Per-key cap on the coarse purge index, so a key that never stops getting
/// fresh feature projections (one cache entry per distinct feature snapshot)
/// can't grow its index entry without bound.
const COARSE_INDEX_CAPACITY: usize = 64;

fn direction_tag(direction: Direction) -> u8 {
    match direction {
        Direction::Long => 0,
        Direction::Short => 1,
    }
}

const PROJECTION_FEATURES: [&str; 5] = ["close", "volume", "rsi_14", "momentum_5", "body_ratio"];
const PROJECTION_PRECISION: f64 = 100.0; // round to 2 decimal places

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    instrument_base: String,
    direction_tag: u8,
    timeframe_minutes: u32,
    quantity_bits: u64,
    projection: Vec<u64>,
}

impl CacheKey {
    pub fn new(
        instrument_base: &str,
        direction: Direction,
        timeframe_minutes: u32,
        quantity: f64,
        features: &std::collections::HashMap<String, f64>,
    ) -> Self {
        let projection = PROJECTION_FEATURES
            .iter()
            .map(|name| {
                let v = features.get(*name).copied().unwrap_or(f64::NAN);
                if v.is_finite() {
                    (v * PROJECTION_PRECISION).round() as i64 as u64
                } else {
                    u64::MAX
                }
            })
            .collect();
        Self {
            instrument_base: instrument_base.to_uppercase(),
            direction_tag: direction_tag(direction),
            timeframe_minutes,
            quantity_bits: quantity.to_bits(),
            projection,
        }
    }

    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// The coarse `(instrument, direction)` identity this key was built
    /// from, with no dependence on the feature projection — the only shape
    /// an outcome record (which carries no features of its own) can rebuild.
    fn coarse(&self) -> (String, u8) {
        (self.instrument_base.clone(), self.direction_tag)
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct ResponseCache<V: Clone> {
    inner: Mutex<LruCache<u64, Entry<V>>>,
    /// Maps a coarse `(instrument, direction)` identity to every fingerprint
    /// cached under it, so outcome intake can purge a key without holding
    /// the fine-grained `CacheKey` (which needs the feature projection) used
    /// to build that fingerprint.
    coarse_index: Mutex<HashMap<(String, u8), Vec<u64>>>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            coarse_index: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let fp = key.fingerprint();
        let mut inner = self.inner.lock();
        match inner.get(&fp) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                inner.pop(&fp);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &CacheKey, value: V) {
        let fp = key.fingerprint();
        self.inner.lock().put(
            fp,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        let mut index = self.coarse_index.lock();
        let fingerprints = index.entry(key.coarse()).or_default();
        if !fingerprints.contains(&fp) {
            fingerprints.push(fp);
        }
        while fingerprints.len() > COARSE_INDEX_CAPACITY {
            fingerprints.remove(0);
        }
    }

    /// Drops any cached entry under this fingerprint.
    pub fn invalidate(&self, key: &CacheKey) {
        self.inner.lock().pop(&key.fingerprint());
    }

    /// Drops every cached decision for the coarse `(instrument, direction)`
    /// identity. Called by outcome intake once new learning has landed for
    /// that key, since none of its cached responses carry the featureless
    /// outcome record's information and may now be stale.
    pub fn invalidate_for(&self, instrument_base: &str, direction: Direction) {
        let coarse = (instrument_base.to_uppercase(), direction_tag(direction));
        if let Some(fingerprints) = self.coarse_index.lock().remove(&coarse) {
            let mut inner = self.inner.lock();
            for fp in fingerprints {
                inner.pop(&fp);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn hit_returns_identical_value() {
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let key = CacheKey::new("MGC", Direction::Long, 1, 1.0, &HashMap::new());
        cache.put(&key, 42);
        assert_eq!(cache.get(&key), Some(42));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_millis(10));
        let key = CacheKey::new("MGC", Direction::Long, 1, 1.0, &HashMap::new());
        cache.put(&key, 42);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn invalidate_for_purges_every_entry_under_the_coarse_key() {
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let mut features_a = HashMap::new();
        features_a.insert("rsi_14".to_string(), 55.0);
        let mut features_b = HashMap::new();
        features_b.insert("rsi_14".to_string(), 62.0);
        let key_a = CacheKey::new("MGC", Direction::Long, 1, 1.0, &features_a);
        let key_b = CacheKey::new("MGC", Direction::Long, 1, 1.0, &features_b);
        let short_key = CacheKey::new("MGC", Direction::Short, 1, 1.0, &HashMap::new());
        cache.put(&key_a, 1);
        cache.put(&key_b, 2);
        cache.put(&short_key, 3);

        cache.invalidate_for("MGC", Direction::Long);

        assert_eq!(cache.get(&key_a), None);
        assert_eq!(cache.get(&key_b), None);
        assert_eq!(cache.get(&short_key), Some(3));
    }

    #[test]
    fn distinct_directions_do_not_collide() {
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let long_key = CacheKey::new("MGC", Direction::Long, 1, 1.0, &HashMap::new());
        let short_key = CacheKey::new("MGC", Direction::Short, 1, 1.0, &HashMap::new());
        cache.put(&long_key, 1);
        cache.put(&short_key, 2);
        assert_eq!(cache.get(&long_key), Some(1));
        assert_eq!(cache.get(&short_key), Some(2));
    }
}
