//! Bounded LRU cache with eviction-triggered release
//!
//! **Why**: Cached content items own live resource handles. Eviction has
//! to free the handle synchronously, before the evicting `set` returns, so
//! callers can rely on "the victim is already released by the time my
//! insert completes".
//!
//! Recency bookkeeping rides on the `lru` crate (O(1) touch and evict);
//! this wrapper adds the release hook and the symmetric `clear` path.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Release hook handed the owned (key, value) pair of each victim.
pub type EvictionHook<K, V> = Box<dyn FnMut(K, V) + Send>;

pub struct EvictingCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    on_evict: EvictionHook<K, V>,
}

impl<K: Hash + Eq, V> EvictingCache<K, V> {
    /// Cache holding at most `max` entries (`max` is clamped to ≥ 1).
    pub fn new(max: usize, on_evict: impl FnMut(K, V) + Send + 'static) -> Self {
        let cap = NonZeroUsize::new(max).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            on_evict: Box::new(on_evict),
        }
    }

    pub fn max(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value, refreshing its recency. A miss is a normal return.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or replace, refreshing recency.
    ///
    /// Replacing an existing key never fires the eviction hook, since the
    /// entry is still present. Inserting past capacity evicts the single
    /// least-recently-touched entry through the hook first.
    pub fn set(&mut self, key: K, value: V) {
        if !self.entries.contains(&key)
            && self.entries.len() == self.max()
            && let Some((victim_key, victim)) = self.entries.pop_lru()
        {
            (self.on_evict)(victim_key, victim);
        }
        self.entries.put(key, value);
    }

    /// Evict every entry, oldest first, through the eviction hook.
    pub fn clear(&mut self) {
        while let Some((key, value)) = self.entries.pop_lru() {
            (self.on_evict)(key, value);
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for EvictingCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictingCache")
            .field("len", &self.len())
            .field("max", &self.max())
            .finish()
    }
}
