//! Opaque index handle exposed to the host.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use vecdex_index::{
    BatchReport, IndexError, IndexManager, IndexStats, IndexingProgress, Key, LoadMode,
    SearchMatch,
};

use crate::typed_array::{Float32Array, Int32Array};

/// Reported by `isa` once the index is released.
const UNKNOWN_ISA: &str = "unknown";

/// Result of a single `add`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AddResult {
    /// Time spent in the engine insert
    pub duration_ms: f64,
}

/// Options for `search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Restrict results to these keys
    pub allowed_keys: Option<Vec<Key>>,
}

/// Cloneable handle to one index. Every clone refers to the same index.
#[derive(Clone)]
pub struct IndexHandle {
    inner: Arc<IndexManager>,
}

impl IndexHandle {
    pub(crate) fn new(manager: IndexManager) -> Self {
        Self {
            inner: Arc::new(manager),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    /// Entries in the index, 0 once released.
    pub fn count(&self) -> usize {
        self.inner.len().unwrap_or(0)
    }

    /// Estimated memory footprint in bytes, 0 once released.
    pub fn memory_usage(&self) -> usize {
        self.inner
            .stats()
            .map(|stats| stats.estimated_memory_bytes)
            .unwrap_or(0)
    }

    /// SIMD instruction set in use, `"unknown"` once released.
    pub fn isa(&self) -> String {
        self.inner
            .isa()
            .unwrap_or_else(|_| UNKNOWN_ISA.to_string())
    }

    pub fn is_indexing(&self) -> bool {
        self.inner.is_indexing()
    }

    pub fn indexing_progress(&self) -> IndexingProgress {
        self.inner.progress()
    }

    /// Last completed batch job, or its deferred error (reported once).
    pub fn get_last_result(&self) -> Result<BatchReport, IndexError> {
        self.inner.last_result()
    }

    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        self.inner.stats()
    }

    /// Release the index. Later calls fail with `Released`.
    pub fn delete(&self) {
        self.inner.release();
    }

    pub fn add(&self, key: Key, vector: &Float32Array) -> Result<AddResult, IndexError> {
        let view = vector.view()?;
        let elapsed = self.inner.add(key, &view)?;
        Ok(AddResult {
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        })
    }

    /// Start a background batch insert. Keys must be non-negative.
    pub fn add_batch(&self, keys: &Int32Array, vectors: &Float32Array) -> Result<(), IndexError> {
        let keys = keys.view()?;
        let vectors = vectors.view()?;
        let keys = keys
            .iter()
            .map(|&key| {
                Key::try_from(key).map_err(|_| {
                    IndexError::InvalidArgument(format!("batch key {} is negative", key))
                })
            })
            .collect::<Result<Vec<Key>, IndexError>>()?;
        self.inner.add_batch(&keys, &vectors)
    }

    pub fn remove(&self, key: Key) -> Result<(), IndexError> {
        self.inner.remove(key)
    }

    pub fn update(&self, key: Key, vector: &Float32Array) -> Result<(), IndexError> {
        let view = vector.view()?;
        self.inner.update(key, &view)
    }

    pub fn search(
        &self,
        vector: &Float32Array,
        k: usize,
        options: Option<&SearchOptions>,
    ) -> Result<Vec<SearchMatch>, IndexError> {
        let view = vector.view()?;
        let allowed = options.and_then(|o| o.allowed_keys.as_deref());
        self.inner.search(&view, k, allowed)
    }

    /// Stored vector for `key` as a fresh array, `None` if absent.
    pub fn get_item_vector(&self, key: Key) -> Result<Option<Float32Array>, IndexError> {
        let vector = self.inner.get_item_vector(key)?;
        Ok(vector.map(|v| Float32Array::from_slice(&v)))
    }

    pub fn save(&self, path: &str) -> Result<(), IndexError> {
        self.inner.save(path)
    }

    pub fn load(&self, path: &str) -> Result<(), IndexError> {
        self.inner.load(path)
    }

    pub fn load_vectors_from_file(&self, path: &str, mode: LoadMode) -> Result<usize, IndexError> {
        self.inner.load_vectors_from_file(path, mode)
    }

    /// Poll every `poll` until no batch job is running, then return its result.
    pub async fn wait_for_indexing(&self, poll: Duration) -> Result<BatchReport, IndexError> {
        let mut ticker = interval(poll.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.inner.is_indexing() {
                break;
            }
            let progress = self.inner.progress();
            debug!(current = progress.current, total = progress.total, "Waiting for batch job");
        }
        self.inner.last_result()
    }
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("dimensions", &self.dimensions())
            .field("metric", &self.inner.metric())
            .field("precision", &self.inner.precision())
            .field("released", &self.inner.is_released())
            .finish()
    }
}
