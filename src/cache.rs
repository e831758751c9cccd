//! Per-instance memoization of read endpoints.
//!
//! Each [`Home`](crate::home::Home) and each zone owns its own [`TtlCache`]; nothing is
//! shared between instances. Entries expire after the policy TTL, and inserting into a
//! full cache evicts the least recently used entry. A miss is filled at most once per
//! key at a time: concurrent callers of the same key wait for the in-flight fill and
//! then read its result. Failed fills are never stored.

use log::{debug, trace};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy {
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,
    fills: HashMap<String, Arc<Mutex<()>>>,
    tick: u64,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    policy: CachePolicy,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(policy: CachePolicy) -> Self {
        TtlCache {
            policy,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                fills: HashMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Return the fresh value for `key`, or run `compute`, store its result and return it.
    pub fn get_or_try_insert_with<E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            trace!("cache hit: {}", key);
            return Ok(value);
        }

        let fill = self.fill_lock(key);
        let _filling = fill.lock().unwrap_or_else(PoisonError::into_inner);

        // another caller may have filled it while we waited
        if let Some(value) = self.get(key) {
            trace!("cache hit after wait: {}", key);
            return Ok(value);
        }

        debug!("cache miss: {}", key);
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Fresh value for `key`, if any. Expired entries are dropped on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        let ttl = self.policy.ttl;
        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;

        match state.entries.get_mut(key) {
            None => return None,
            Some(entry) if entry.inserted_at.elapsed() < ttl => {
                entry.last_used = tick;
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }
        trace!("cache expired: {}", key);
        state.entries.remove(key);
        None
    }

    pub fn insert(&self, key: &str, value: V) {
        if self.policy.max_entries == 0 {
            return;
        }
        let ttl = self.policy.ttl;
        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;

        state.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);

        if !state.entries.contains_key(key) && state.entries.len() >= self.policy.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("cache evict: {}", oldest);
                state.entries.remove(&oldest);
            }
        }

        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including ones that expired but were not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fill_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut state = self.lock();
        state.fills.entry(key.to_string()).or_default().clone()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        TtlCache::new(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting(calls: &AtomicUsize, value: i32) -> impl FnOnce() -> Result<i32, String> + '_ {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[test]
    fn second_read_within_ttl_is_a_hit() {
        let cache = TtlCache::default();
        let calls = AtomicUsize::new(0);

        assert_eq!(cache.get_or_try_insert_with("home", counting(&calls, 1)), Ok(1));
        assert_eq!(cache.get_or_try_insert_with("home", counting(&calls, 2)), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entry_is_recomputed_once() {
        let cache = TtlCache::new(CachePolicy {
            ttl: Duration::from_millis(20),
            max_entries: 16,
        });
        let calls = AtomicUsize::new(0);

        assert_eq!(cache.get_or_try_insert_with("weather", counting(&calls, 1)), Ok(1));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get_or_try_insert_with("weather", counting(&calls, 2)), Ok(2));
        assert_eq!(cache.get_or_try_insert_with("weather", counting(&calls, 3)), Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn full_cache_evicts_least_recently_used() {
        let cache = TtlCache::new(CachePolicy {
            ttl: Duration::from_secs(60),
            max_entries: 2,
        });
        cache.insert("a", 1);
        cache.insert("b", 2);
        // touch "a" so "b" becomes the oldest
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache = TtlCache::new(CachePolicy {
            ttl: Duration::from_secs(60),
            max_entries: 2,
        });
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn failed_compute_is_not_stored() {
        let cache: TtlCache<i32> = TtlCache::default();
        let err = cache.get_or_try_insert_with("users", || Err::<i32, _>("boom".to_string()));
        assert_eq!(err, Err("boom".to_string()));
        assert!(cache.is_empty());

        let calls = AtomicUsize::new(0);
        assert_eq!(cache.get_or_try_insert_with("users", counting(&calls, 5)), Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let cache = TtlCache::default();
        let calls = AtomicUsize::new(0);
        cache.get_or_try_insert_with("early_start", counting(&calls, 1)).unwrap();
        cache.invalidate("early_start");
        assert_eq!(cache.get_or_try_insert_with("early_start", counting(&calls, 2)), Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_misses_compute_once() {
        let cache = Arc::new(TtlCache::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache.get_or_try_insert_with("zones", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok::<_, String>(7)
                    })
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            assert_eq!(h.join().unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_capacity_never_stores() {
        let cache = TtlCache::new(CachePolicy {
            ttl: Duration::from_secs(60),
            max_entries: 0,
        });
        let calls = AtomicUsize::new(0);
        cache.get_or_try_insert_with("me", counting(&calls, 1)).unwrap();
        cache.get_or_try_insert_with("me", counting(&calls, 1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
