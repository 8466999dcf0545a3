//! Ordered player id sets
//!
//! Ids are kept in a `BTreeSet`, so every roster built from an [`IdSet`]
//! lists players in ascending lexicographic order no matter which filter
//! finished first.

use std::collections::btree_set;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet(BTreeSet<String>);

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of a filter result, dropping the matched values
    pub fn from_keys<V>(values: &HashMap<String, V>) -> Self {
        values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.0.iter()
    }

    /// Keep only ids for which `keep` holds
    pub fn retain(&mut self, keep: impl FnMut(&String) -> bool) {
        self.0.retain(keep);
    }

    /// Ids of `self` absent from `other`
    pub fn difference(&self, other: &IdSet) -> IdSet {
        IdSet(self.0.difference(&other.0).cloned().collect())
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

/// Ids present in every map. No maps means no candidates.
pub fn intersect_keys<'a, V: 'a>(results: impl IntoIterator<Item = &'a HashMap<String, V>>) -> IdSet {
    let mut results = results.into_iter();
    let Some(first) = results.next() else {
        return IdSet::new();
    };
    let mut candidates = IdSet::from_keys(first);
    for result in results {
        if candidates.is_empty() {
            break;
        }
        candidates.retain(|id| result.contains_key(id));
    }
    candidates
}

impl FromIterator<String> for IdSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        IdSet(iter.into_iter().collect())
    }
}

impl Extend<String> for IdSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for IdSet {
    type Item = String;
    type IntoIter = btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
