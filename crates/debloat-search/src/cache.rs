// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Bounded memo store for oracle results.
//!
//! Keys are canonicalized configurations (sorted, deduplicated), so the
//! same item set tested in a different order hits the cache. Eviction is
//! oldest-first once the capacity is reached.

use crate::Outcome;
use std::collections::{BTreeMap, VecDeque};

/// Matches the cache bound of the historical implementation.
const DEFAULT_CAPACITY: usize = 16384;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct OutcomeCache<I> {
    map: BTreeMap<Vec<I>, Outcome>,
    order: VecDeque<Vec<I>>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl<I: Clone + Ord> Default for OutcomeCache<I> {
    fn default() -> Self {
        OutcomeCache::new()
    }
}

impl<I: Clone + Ord> OutcomeCache<I> {
    pub fn new() -> Self {
        OutcomeCache::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        OutcomeCache {
            map: BTreeMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    fn key(config: &[I]) -> Vec<I> {
        let mut key = config.to_vec();
        key.sort();
        key.dedup();
        key
    }

    pub fn get(&mut self, config: &[I]) -> Option<Outcome> {
        match self.map.get(&Self::key(config)) {
            Some(outcome) => {
                self.hits += 1;
                Some(*outcome)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, config: &[I], outcome: Outcome) {
        let key = Self::key(config);
        if self.map.insert(key.clone(), outcome).is_none() {
            self.order.push_back(key);
            while self.map.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.map.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_insensitive() {
        let mut cache = OutcomeCache::new();
        cache.insert(&[3, 1, 2], Outcome::Fail);
        assert_eq!(cache.get(&[1, 2, 3]), Some(Outcome::Fail));
        assert_eq!(cache.get(&[2, 3, 1]), Some(Outcome::Fail));
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        let mut cache = OutcomeCache::with_capacity(2);
        cache.insert(&[1], Outcome::Pass);
        cache.insert(&[2], Outcome::Fail);
        cache.insert(&[3], Outcome::Pass);
        assert_eq!(cache.get(&[1]), None);
        assert_eq!(cache.get(&[2]), Some(Outcome::Fail));
        assert_eq!(cache.get(&[3]), Some(Outcome::Pass));
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_miss_counter() {
        let mut cache: OutcomeCache<u32> = OutcomeCache::new();
        assert_eq!(cache.get(&[7]), None);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 0,
                misses: 1,
                entries: 0
            }
        );
    }
}
