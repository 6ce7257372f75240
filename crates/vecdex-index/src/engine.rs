//! ANN engine seam.
//!
//! The index manager never talks to a concrete engine directly; it owns one
//! `AnnEngine` and calls it only while holding its lock. Engines therefore
//! need no internal synchronization of their own.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::filter::AllowList;

/// Caller-assigned vector key.
pub type Key = u64;

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Key of the matched vector
    pub key: Key,
    /// Distance to the query (lower = nearer, for every metric)
    pub distance: f32,
}

impl SearchMatch {
    pub fn new(key: Key, distance: f32) -> Self {
        Self { key, distance }
    }
}

/// Opaque approximate-nearest-neighbor index.
pub trait AnnEngine: Send + 'static {
    /// Reserve room for `capacity` entries and `threads` concurrent workers.
    fn reserve(&mut self, capacity: usize, threads: usize) -> bool;

    fn add(&mut self, key: Key, vector: &[f32]) -> Result<(), EngineError>;

    /// Remove `key`. A missing key is an error.
    fn remove(&mut self, key: Key) -> Result<(), EngineError>;

    /// Copy the vector stored under `key` into `out`. Returns false if absent.
    fn get(&self, key: Key, out: &mut [f32]) -> bool;

    /// Up to `k` nearest entries, ascending by distance.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchMatch>, EngineError>;

    /// Like [`search`](Self::search), skipping keys `filter` does not allow.
    fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        filter: &AllowList,
    ) -> Result<Vec<SearchMatch>, EngineError>;

    fn size(&self) -> usize;

    fn capacity(&self) -> usize;

    fn dimensions(&self) -> usize;

    fn metric_name(&self) -> &'static str;

    /// Name of the SIMD instruction set used for distance kernels.
    fn isa_name(&self) -> String;

    fn save(&self, path: &str) -> Result<(), EngineError>;

    /// Replace the contents with the index stored at `path`.
    ///
    /// On failure the current contents must be left untouched.
    fn load(&mut self, path: &str) -> Result<(), EngineError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Brute-force engine for deterministic manager tests.

    use std::time::Duration;

    use super::*;

    /// Exact L2 engine with failure injection.
    #[derive(Debug, Default)]
    pub(crate) struct FlatEngine {
        dimensions: usize,
        capacity: usize,
        entries: Vec<(Key, Vec<f32>)>,
        /// `add` of this key fails
        pub fail_on: Option<Key>,
        /// `add` of this key panics
        pub panic_on: Option<Key>,
        /// `reserve` always fails
        pub refuse_reserve: bool,
        /// Sleep inside every `add`
        pub add_delay: Duration,
    }

    impl FlatEngine {
        pub(crate) fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                ..Default::default()
            }
        }

        fn distance(a: &[f32], b: &[f32]) -> f32 {
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
        }

        fn ranked(&self, query: &[f32], k: usize, allow: impl Fn(Key) -> bool) -> Vec<SearchMatch> {
            // Result slots are reserved for all `k` up front, as native engines do.
            let mut matches: Vec<SearchMatch> = Vec::with_capacity(k);
            matches.extend(
                self.entries
                    .iter()
                    .filter(|(key, _)| allow(*key))
                    .map(|(key, v)| SearchMatch::new(*key, Self::distance(query, v))),
            );
            matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            matches.truncate(k);
            matches
        }
    }

    impl AnnEngine for FlatEngine {
        fn reserve(&mut self, capacity: usize, _threads: usize) -> bool {
            if self.refuse_reserve {
                return false;
            }
            self.capacity = self.capacity.max(capacity);
            true
        }

        fn add(&mut self, key: Key, vector: &[f32]) -> Result<(), EngineError> {
            if !self.add_delay.is_zero() {
                std::thread::sleep(self.add_delay);
            }
            if self.panic_on == Some(key) {
                panic!("injected panic on key {}", key);
            }
            if self.fail_on == Some(key) {
                return Err(EngineError::new(format!("injected failure on key {}", key)));
            }
            if self.entries.len() >= self.capacity {
                return Err(EngineError::new("reserve capacity ahead of insertions"));
            }
            if self.entries.iter().any(|(k, _)| *k == key) {
                return Err(EngineError::new(format!("duplicate key {}", key)));
            }
            self.entries.push((key, vector.to_vec()));
            Ok(())
        }

        fn remove(&mut self, key: Key) -> Result<(), EngineError> {
            let before = self.entries.len();
            self.entries.retain(|(k, _)| *k != key);
            if self.entries.len() == before {
                return Err(EngineError::new(format!("key not found: {}", key)));
            }
            Ok(())
        }

        fn get(&self, key: Key, out: &mut [f32]) -> bool {
            match self.entries.iter().find(|(k, _)| *k == key) {
                Some((_, v)) => {
                    out.copy_from_slice(v);
                    true
                }
                None => false,
            }
        }

        fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchMatch>, EngineError> {
            Ok(self.ranked(query, k, |_| true))
        }

        fn search_filtered(
            &self,
            query: &[f32],
            k: usize,
            filter: &AllowList,
        ) -> Result<Vec<SearchMatch>, EngineError> {
            Ok(self.ranked(query, k, |key| filter.allows(key)))
        }

        fn size(&self) -> usize {
            self.entries.len()
        }

        fn capacity(&self) -> usize {
            self.capacity
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn metric_name(&self) -> &'static str {
            "l2sq"
        }

        fn isa_name(&self) -> String {
            "serial".to_string()
        }

        fn save(&self, _path: &str) -> Result<(), EngineError> {
            Err(EngineError::new("flat engine cannot persist"))
        }

        fn load(&mut self, _path: &str) -> Result<(), EngineError> {
            Err(EngineError::new("flat engine cannot persist"))
        }
    }
}
