//! Hash-consing table shared by the diagram managers.
//!
//! Maps a structural node key to the index of its canonical node in the
//! manager's pool. Each manager owns one table, so there is no global state.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct UniqueTable<K> {
    nodes: HashMap<K, u32>,
    /// Ceiling on the number of interned nodes.
    limit: Option<usize>,
    peak: usize,
    what: &'static str,
}

impl<K> UniqueTable<K>
where
    K: Hash + Eq,
{
    pub fn new(what: &'static str, limit: Option<usize>) -> Self {
        Self {
            nodes: HashMap::new(),
            limit,
            peak: 0,
            what,
        }
    }

    pub fn find(&self, key: &K) -> Option<u32> {
        self.nodes.get(key).copied()
    }

    /// Returns the index for `key`, allocating it with `alloc` on a miss.
    ///
    /// Fails without touching the table when the node limit is reached.
    pub fn intern(&mut self, key: K, alloc: impl FnOnce() -> u32) -> Result<u32> {
        if let Some(&index) = self.nodes.get(&key) {
            return Ok(index);
        }
        if let Some(limit) = self.limit {
            if self.nodes.len() >= limit {
                log::debug!("{} limit {} reached", self.what, limit);
                return Err(Error::ResourceLimit {
                    what: self.what,
                    limit,
                });
            }
        }
        let index = alloc();
        self.nodes.insert(key, index);
        self.peak = self.peak.max(self.nodes.len());
        Ok(index)
    }

    /// Forgets every node whose index is `watermark` or above.
    ///
    /// Used to undo a failed operation: the manager truncates its pool to
    /// the same watermark, so the freed indices get reused.
    pub fn rollback(&mut self, watermark: u32) {
        let before = self.nodes.len();
        self.nodes.retain(|_, index| *index < watermark);
        log::debug!("{}: rolled back {} nodes", self.what, before - self.nodes.len());
    }

    /// Number of live (interned) nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}
