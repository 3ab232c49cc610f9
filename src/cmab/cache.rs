//! Cache of CMAB decisions.
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Cached CMAB decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmabCacheValue {
    /// Hash of the filtered attributes the decision was made for.
    pub attributes_hash: u32,
    #[allow(missing_docs)]
    pub variation_id: String,
    #[allow(missing_docs)]
    pub cmab_uuid: String,
}

/// Storage of CMAB decisions. Implementations must be internally thread-safe. Size and
/// expiration bounds are up to the implementation.
pub trait CmabCache: Send + Sync {
    #[allow(missing_docs)]
    fn lookup(&self, key: &str) -> Option<CmabCacheValue>;
    #[allow(missing_docs)]
    fn save(&self, key: String, value: CmabCacheValue);
    #[allow(missing_docs)]
    fn remove(&self, key: &str);
    /// Remove all entries.
    fn reset(&self);
}

#[derive(Debug)]
struct CacheEntry {
    value: CmabCacheValue,
    access_count: u64,
    saved_at: Instant,
}

#[derive(Debug, Default)]
struct LruState {
    map: HashMap<String, CacheEntry>,
    access_counter: u64,
}

/// Least-recently-used cache with optional time-to-live.
///
/// Capacity of zero disables caching. Zero TTL means entries never expire.
#[derive(Debug)]
pub struct LruCmabCache {
    state: Mutex<LruState>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl LruCmabCache {
    #[allow(missing_docs)]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        LruCmabCache {
            state: Mutex::new(LruState {
                map: HashMap::with_capacity(capacity.min(1024)),
                access_counter: 0,
            }),
            capacity,
            ttl: (!ttl.is_zero()).then_some(ttl),
        }
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruState> {
        self.state
            .lock()
            .expect("thread holding cache lock should not panic")
    }
}

impl CmabCache for LruCmabCache {
    fn lookup(&self, key: &str) -> Option<CmabCacheValue> {
        if self.capacity == 0 {
            return None;
        }

        let mut state = self.lock();
        state.access_counter += 1;
        let access_count = state.access_counter;

        let entry = state.map.get_mut(key)?;
        if self.ttl.is_some_and(|ttl| entry.saved_at.elapsed() > ttl) {
            state.map.remove(key);
            return None;
        }
        entry.access_count = access_count;
        Some(entry.value.clone())
    }

    fn save(&self, key: String, value: CmabCacheValue) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.lock();
        state.access_counter += 1;

        if state.map.len() >= self.capacity && !state.map.contains_key(&key) {
            let lru_key = state
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.access_count)
                .map(|(k, _)| k.clone());
            if let Some(lru_key) = lru_key {
                state.map.remove(&lru_key);
            }
        }

        let entry = CacheEntry {
            value,
            access_count: state.access_counter,
            saved_at: Instant::now(),
        };
        state.map.insert(key, entry);
    }

    fn remove(&self, key: &str) {
        self.lock().map.remove(key);
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.map.clear();
        state.access_counter = 0;
    }
}
