//! L1: bounded in-memory recency cache.
//!
//! A single lock guards the map across lookup, insertion and eviction.
//! Recency is tracked with a monotonic tick per entry; eviction removes
//! the entry with the smallest tick. TTL is enforced on read.

use crate::cache::entry::CacheEntry;
use aide_types::prelude::Fingerprint;
use std::collections::HashMap;
use std::sync::Mutex;

struct Slot {
    entry: CacheEntry,
    tick: u64,
}

struct Inner {
    slots: HashMap<Fingerprint, Slot>,
    next_tick: u64,
}

pub struct MemoryCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        MemoryCache {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                next_tick: 0,
            }),
        }
    }

    /// Lookup with TTL enforcement. A hit refreshes recency and access
    /// stats; an expired entry is dropped and reported as a miss.
    pub fn get(&self, key: &str, now: f64) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().expect("l1 lock poisoned");
        let expired = match inner.slots.get(key) {
            Some(slot) => slot.entry.is_expired(now),
            None => return None,
        };
        if expired {
            inner.slots.remove(key);
            return None;
        }
        let tick = inner.next_tick;
        inner.next_tick += 1;
        let slot = inner.slots.get_mut(key).expect("checked above");
        slot.tick = tick;
        slot.entry.touch(now);
        Some(slot.entry.clone())
    }

    /// Insert, evicting least-recently-used entries when over capacity.
    /// Returns the number of evictions performed.
    pub fn insert(&self, entry: CacheEntry) -> u64 {
        let mut inner = self.inner.lock().expect("l1 lock poisoned");
        let mut evicted = 0;
        let key = entry.key.clone();
        let replacing = inner.slots.contains_key(&key);
        while !replacing && inner.slots.len() >= self.capacity {
            let oldest = inner
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.tick)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    inner.slots.remove(&k);
                    evicted += 1;
                }
                None => break,
            }
        }
        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.slots.insert(key, Slot { entry, tick });
        evicted
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("l1 lock poisoned");
        inner.slots.remove(key).is_some()
    }

    /// Drop expired entries eagerly. Returns the number removed.
    pub fn cleanup_expired(&self, now: f64) -> usize {
        let mut inner = self.inner.lock().expect("l1 lock poisoned");
        let stale: Vec<Fingerprint> = inner
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            inner.slots.remove(key);
        }
        stale.len()
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().expect("l1 lock poisoned");
        let count = inner.slots.len();
        inner.slots.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("l1 lock poisoned").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
