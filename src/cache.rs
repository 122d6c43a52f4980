//! Memo table for diagram operations.
//!
//! A plain [`HashMap`] with hit/miss counters. The capacity is fixed at
//! construction (`2^bits` entries); once it fills up the whole table is
//! dropped and refilled. Losing entries only costs recomputation.

use std::collections::HashMap;
use std::hash::Hash;

pub struct ComputedCache<K, V> {
    map: HashMap<K, V>,
    capacity: usize,
    hits: usize,
    misses: usize,
    clears: usize,
}

impl<K, V> Default for ComputedCache<K, V> {
    fn default() -> Self {
        Self::new(16)
    }
}

impl<K, V> ComputedCache<K, V> {
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits should be in the range 0..=31");
        let capacity = 1 << bits;
        Self {
            map: HashMap::with_capacity(capacity.min(1 << 12)),
            capacity,
            hits: 0,
            misses: 0,
            clears: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    /// How many times the table was flushed for being full.
    pub fn clears(&self) -> usize {
        self.clears
    }

    /// Fraction of lookups that hit, or `0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K, V> ComputedCache<K, V>
where
    K: Hash + Eq,
    V: Copy,
{
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.map.get(key) {
            Some(&v) => {
                self.hits += 1;
                Some(v)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            log::trace!("cache full ({} entries), clearing", self.map.len());
            self.map.clear();
            self.clears += 1;
        }
        self.map.insert(key, value);
    }
}
