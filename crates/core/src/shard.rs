//! Fixed-shard concurrent map.
//!
//! Lock granularity is the shard a key hashes to, so writers for unrelated
//! keys (different sites, different visitors) proceed without contention.
//! There is no whole-map lock anywhere.

use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const DEFAULT_SHARDS: usize = 64;

/// A hash map split across independently locked shards.
pub struct ShardedMap<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K: Hash + Eq, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl<K: Hash + Eq, V> ShardedMap<K, V> {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Runs `f` on the value for `key`, inserting `V::default()` first if
    /// absent. The shard lock is held for the duration of `f`.
    pub fn with_entry<T>(&self, key: K, f: impl FnOnce(&mut V) -> T) -> T
    where
        V: Default,
    {
        let mut shard = self.shard(&key).write();
        f(shard.entry(key).or_default())
    }

    /// Runs `f` on the value for `key` if present.
    pub fn with_value<T>(&self, key: &K, f: impl FnOnce(&V) -> T) -> Option<T> {
        let shard = self.shard(key).read();
        shard.get(key).map(f)
    }

    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).read().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.shard(&key).write().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Visits every entry. Shards are locked one at a time, so this never
    /// blocks concurrent writers globally.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for shard in &self.shards {
            let guard = shard.read();
            for (k, v) in guard.iter() {
                f(k, v);
            }
        }
    }

    /// Visits every entry mutably, shard by shard.
    pub fn for_each_mut(&self, mut f: impl FnMut(&K, &mut V)) {
        for shard in &self.shards {
            let mut guard = shard.write();
            for (k, v) in guard.iter_mut() {
                f(k, v);
            }
        }
    }

    /// Retains entries satisfying the predicate, shard by shard.
    pub fn retain(&self, mut f: impl FnMut(&K, &mut V) -> bool) {
        for shard in &self.shards {
            shard.write().retain(|k, v| f(k, v));
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }
}
