//! Insertion-ordered counting.

use std::hash::Hash;

use indexmap::IndexMap;
use serde::Serialize;

/// Key -> count map that remembers the order keys were first seen.
///
/// Rankings built from it break ties by that order, so the same snapshot
/// always ranks the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CountTable<K: Hash + Eq> {
    counts: IndexMap<K, u64>,
}

impl<K: Hash + Eq> Default for CountTable<K> {
    fn default() -> Self {
        Self {
            counts: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq> CountTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn get(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    /// Key with the highest count; the earliest seen wins a tie.
    pub fn most_common(&self) -> Option<(&K, u64)> {
        self.iter()
            .fold(None, |best: Option<(&K, u64)>, (k, v)| match best {
                Some((_, top)) if top >= v => best,
                _ => Some((k, v)),
            })
    }
}

impl<K: Hash + Eq + Clone> CountTable<K> {
    /// At most `k` entries by descending count, ties in first-seen order.
    pub fn top_k(&self, k: usize) -> Vec<(K, u64)> {
        let mut ranked: Vec<(K, u64)> = self.iter().map(|(key, v)| (key.clone(), v)).collect();
        // Stable sort keeps first-seen order among equal counts.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(k);
        ranked
    }
}

impl<K: Hash + Eq> FromIterator<K> for CountTable<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut table = Self::new();
        for key in iter {
            table.add(key);
        }
        table
    }
}
