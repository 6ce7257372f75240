//! Allow-list predicate for filtered search.

use std::collections::HashSet;
use std::panic;

use crate::engine::Key;

/// Membership test restricting search results to a set of keys.
///
/// Evaluated by the engine for every candidate it visits, from inside its
/// own traversal: lookups are O(1) expected, take no locks, and never unwind.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    keys: HashSet<Key>,
}

impl AllowList {
    pub fn new(keys: &[Key]) -> Self {
        keys.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether `key` may appear in results. Any internal fault counts as "no".
    pub fn allows(&self, key: Key) -> bool {
        panic::catch_unwind(|| self.keys.contains(&key)).unwrap_or(false)
    }
}

impl FromIterator<Key> for AllowList {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}
