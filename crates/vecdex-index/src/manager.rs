//! Concurrent index manager.
//!
//! One mutex guards the engine and the last batch outcome. Foreground calls
//! hold it for a single engine call; background batch workers take it once per
//! insertion so foreground work interleaves with long batches.

use std::any::Any;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use vecdex_types::{Metric, Precision};

use crate::batch::{BatchProgress, BatchRecord, BatchReport, ClaimGuard, IndexingProgress};
use crate::engine::{AnnEngine, Key, SearchMatch};
use crate::error::IndexError;
use crate::filter::AllowList;
use crate::hnsw::{IndexConfig, UsearchEngine};
use crate::path::sanitize_path;

/// Capacity floor for every reservation.
const MIN_CAPACITY: usize = 100;

/// Per-entry graph overhead used by the memory estimate.
const ENTRY_OVERHEAD_BYTES: usize = 64 + 32 * 4;

/// Fixed overhead used by the memory estimate.
const BASE_OVERHEAD_BYTES: usize = 1_048_576;

/// Size of one raw vector component on disk.
const COMPONENT_BYTES: usize = 4;

/// How `load_vectors_from_file` inserts the decoded vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Hand off to a background batch job and return immediately
    #[default]
    Background,
    /// Insert on the calling thread and return when done
    Blocking,
}

/// Index statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dimensions: usize,
    pub count: usize,
    pub metric_name: String,
    /// Computed estimate, not queried from the engine
    pub estimated_memory_bytes: usize,
}

struct Slot<E> {
    engine: Option<E>,
    record: BatchRecord,
}

struct Shared<E> {
    dimensions: usize,
    metric: Metric,
    precision: Precision,
    threads: usize,
    slot: Mutex<Slot<E>>,
    progress: Arc<BatchProgress>,
}

/// Copied batch input, owned by the worker.
struct BatchJob {
    keys: Vec<Key>,
    vectors: Vec<f32>,
}

enum JobOutcome {
    Completed(usize),
    Failed(String),
    /// Engine released mid-job
    Aborted,
}

/// Grow capacity ahead of `incoming` insertions: double, with a floor of 100.
fn ensure_capacity<E: AnnEngine>(engine: &mut E, incoming: usize, threads: usize) {
    let size = engine.size();
    let capacity = engine.capacity();
    let needed = size.saturating_add(incoming);
    if needed <= capacity {
        return;
    }
    let target = needed
        .max(capacity.saturating_mul(2))
        .max(MIN_CAPACITY);
    if engine.reserve(target, threads) {
        debug!(from = capacity, to = target, "Grew index capacity");
    } else {
        warn!(size, capacity, target, "Failed to grow index capacity");
    }
}

/// Decode a raw little-endian f32 file of `dimensions`-wide records.
///
/// The size is checked from metadata first; records are decoded one at a
/// time so only the decoded vectors are held in memory.
fn read_vector_file(path: &str, dimensions: usize) -> Result<Vec<f32>, IndexError> {
    let persistence = |e: io::Error| IndexError::Persistence {
        path: path.to_string(),
        message: e.to_string(),
    };
    let file = File::open(path).map_err(persistence)?;
    let len = file.metadata().map_err(persistence)?.len();

    let record_len = dimensions * COMPONENT_BYTES;
    let malformed = || IndexError::MalformedFile {
        path: path.to_string(),
        len,
        record_len,
    };
    let total = usize::try_from(len).map_err(|_| malformed())?;
    if total == 0 || total % record_len != 0 {
        return Err(malformed());
    }

    let mut reader = BufReader::new(file);
    let mut record = vec![0u8; record_len];
    let mut vectors = Vec::with_capacity(total / COMPONENT_BYTES);
    for _ in 0..total / record_len {
        reader.read_exact(&mut record).map_err(persistence)?;
        vectors.extend(
            record
                .chunks_exact(COMPONENT_BYTES)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
    }
    Ok(vectors)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "batch worker panicked".to_string()
    }
}

impl<E: AnnEngine> Shared<E> {
    fn lock(&self) -> Result<MutexGuard<'_, Slot<E>>, IndexError> {
        self.slot.lock().map_err(|_| IndexError::LockPoisoned)
    }

    /// Lock, clearing poison left by a panicking holder.
    fn lock_recovered(&self) -> MutexGuard<'_, Slot<E>> {
        self.slot.lock().unwrap_or_else(|poisoned| {
            self.slot.clear_poison();
            poisoned.into_inner()
        })
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }

    fn insert_all(&self, claim: &ClaimGuard, job: &BatchJob) -> JobOutcome {
        let records = job.vectors.chunks_exact(self.dimensions);
        for (i, (key, vector)) in job.keys.iter().zip(records).enumerate() {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(_) => return JobOutcome::Failed("Index lock poisoned".to_string()),
            };
            let Some(engine) = slot.engine.as_mut() else {
                return JobOutcome::Aborted;
            };
            if let Err(e) = engine.add(*key, vector) {
                return JobOutcome::Failed(format!("Error adding at index {}: {}", i, e));
            }
            drop(slot);
            claim.progress().advance();
        }
        JobOutcome::Completed(job.keys.len())
    }

    /// Run a batch job to completion and record its outcome.
    ///
    /// The caller keeps `claim` alive until this returns, so the outcome is
    /// recorded before the running flag clears.
    fn run_job(&self, claim: &ClaimGuard, job: BatchJob) -> JobOutcome {
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.insert_all(claim, &job)))
            .unwrap_or_else(|payload| JobOutcome::Failed(panic_message(payload)));

        let mut slot = self.lock_recovered();
        match &outcome {
            JobOutcome::Completed(count) => {
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                slot.record.complete(duration_ms, *count);
                info!(count, duration_ms, "Batch job completed");
            }
            JobOutcome::Failed(message) => {
                error!(error = %message, "Batch job failed");
                slot.record.fail(message.clone());
            }
            JobOutcome::Aborted => {
                debug!("Index released during batch job, stopping");
            }
        }
        outcome
    }
}

/// Thread-safe manager around one ANN engine.
///
/// All methods take `&self`; share the manager across threads with `Arc`.
/// Dropping it releases the engine, which stops any running batch job at its
/// next insertion.
pub struct IndexManager<E: AnnEngine = UsearchEngine> {
    shared: Arc<Shared<E>>,
}

impl IndexManager<UsearchEngine> {
    /// Build a usearch-backed index.
    pub fn create(config: IndexConfig) -> Result<Self, IndexError> {
        if config.dimensions == 0 {
            return Err(IndexError::InvalidArgument(
                "dimensions must be > 0".to_string(),
            ));
        }
        let engine = UsearchEngine::new(config.clone())?;
        Self::with_engine(engine, &config)
    }
}

impl<E: AnnEngine> IndexManager<E> {
    /// Wrap an already-built engine, reserving initial capacity.
    ///
    /// `config.dimensions` must be non-zero and match the engine's.
    pub fn with_engine(mut engine: E, config: &IndexConfig) -> Result<Self, IndexError> {
        if config.dimensions == 0 {
            return Err(IndexError::InvalidArgument(
                "dimensions must be > 0".to_string(),
            ));
        }
        if engine.dimensions() != config.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: config.dimensions,
                actual: engine.dimensions(),
            });
        }
        let threads = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let initial = config.initial_capacity.max(MIN_CAPACITY);
        if !engine.reserve(initial, threads) {
            warn!(capacity = initial, threads, "Failed to reserve initial capacity");
        }
        info!(
            dims = config.dimensions,
            metric = %config.metric,
            precision = %config.precision,
            threads,
            capacity = engine.capacity(),
            "Created vector index"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                dimensions: config.dimensions,
                metric: config.metric,
                precision: config.precision,
                threads,
                slot: Mutex::new(Slot {
                    engine: Some(engine),
                    record: BatchRecord::default(),
                }),
                progress: Arc::new(BatchProgress::new()),
            }),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.shared.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.shared.metric
    }

    pub fn precision(&self) -> Precision {
        self.shared.precision
    }

    /// Run `f` against the engine under the lock.
    fn locked<T>(
        &self,
        f: impl FnOnce(&mut E) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let mut slot = self.shared.lock()?;
        let engine = slot.engine.as_mut().ok_or(IndexError::Released)?;
        f(engine)
    }

    /// Insert one vector. Returns the time spent in the engine call.
    pub fn add(&self, key: Key, vector: &[f32]) -> Result<Duration, IndexError> {
        self.locked(|engine| {
            self.shared.check_dimensions(vector.len())?;
            ensure_capacity(engine, 1, self.shared.threads);
            let start = Instant::now();
            engine.add(key, vector)?;
            let elapsed = start.elapsed();
            debug!(key, ?elapsed, "Added vector");
            Ok(elapsed)
        })
    }

    /// Start a background job inserting `keys[i]` -> `vectors[i*dims..]`.
    ///
    /// Returns once the input is copied and the worker is launched. Poll
    /// [`is_indexing`](Self::is_indexing) and read the outcome with
    /// [`last_result`](Self::last_result).
    pub fn add_batch(&self, keys: &[Key], vectors: &[f32]) -> Result<(), IndexError> {
        let claim = self.shared.progress.try_claim().ok_or(IndexError::Busy)?;
        let dims = self.shared.dimensions;
        if vectors.len() % dims != 0 || vectors.len() / dims != keys.len() {
            return Err(IndexError::BatchSizeMismatch {
                keys: keys.len(),
                vectors: vectors.len(),
                dimensions: dims,
            });
        }
        self.locked(|engine| {
            ensure_capacity(engine, keys.len(), self.shared.threads);
            Ok(())
        })?;

        let job = BatchJob {
            keys: keys.to_vec(),
            vectors: vectors.to_vec(),
        };
        claim.begin(job.keys.len());
        info!(count = job.keys.len(), "Starting batch job");
        self.spawn_job(claim, job)
    }

    fn spawn_job(&self, claim: ClaimGuard, job: BatchJob) -> Result<(), IndexError> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("vecdex-batch".to_string())
            .spawn(move || {
                shared.run_job(&claim, job);
                drop(claim);
            })?;
        Ok(())
    }

    /// Remove `key`. A missing key is an engine error.
    pub fn remove(&self, key: Key) -> Result<(), IndexError> {
        self.locked(|engine| {
            engine.remove(key)?;
            debug!(key, "Removed vector");
            Ok(())
        })
    }

    /// Replace the vector under `key`, inserting it if absent.
    pub fn update(&self, key: Key, vector: &[f32]) -> Result<(), IndexError> {
        self.locked(|engine| {
            self.shared.check_dimensions(vector.len())?;
            if let Err(e) = engine.remove(key) {
                debug!(key, error = %e, "No previous entry to replace");
            }
            ensure_capacity(engine, 1, self.shared.threads);
            engine.add(key, vector)?;
            debug!(key, "Updated vector");
            Ok(())
        })
    }

    /// Up to `k` nearest entries, ascending by distance.
    ///
    /// With `allowed_keys`, only those keys can appear; an empty list yields
    /// no results.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        allowed_keys: Option<&[Key]>,
    ) -> Result<Vec<SearchMatch>, IndexError> {
        let filter = allowed_keys.map(AllowList::new);
        self.locked(|engine| {
            self.shared.check_dimensions(query.len())?;
            // The engine allocates result slots for all `k` up front.
            let k = k.min(engine.size());
            if k == 0 {
                return Ok(Vec::new());
            }
            let results = match &filter {
                Some(filter) if filter.is_empty() => Vec::new(),
                Some(filter) => engine.search_filtered(query, k, filter)?,
                None => engine.search(query, k)?,
            };
            debug!(k, found = results.len(), filtered = filter.is_some(), "Search complete");
            Ok(results)
        })
    }

    /// Stored vector for `key`, or `None` if absent.
    pub fn get_item_vector(&self, key: Key) -> Result<Option<Vec<f32>>, IndexError> {
        let mut out = vec![0.0f32; self.shared.dimensions];
        let found = self.locked(|engine| Ok(engine.get(key, &mut out)))?;
        Ok(found.then_some(out))
    }

    /// Insert every record of a raw little-endian f32 file under keys `0..n`.
    ///
    /// Returns the number of vectors in the file.
    pub fn load_vectors_from_file(&self, path: &str, mode: LoadMode) -> Result<usize, IndexError> {
        let path = sanitize_path(path)?;
        let claim = self.shared.progress.try_claim().ok_or(IndexError::Busy)?;
        if self.is_released() {
            return Err(IndexError::Released);
        }

        let vectors = read_vector_file(path, self.shared.dimensions)?;
        let count = vectors.len() / self.shared.dimensions;
        let keys: Vec<Key> = (0..count as Key).collect();

        self.locked(|engine| {
            ensure_capacity(engine, count, self.shared.threads);
            Ok(())
        })?;
        claim.begin(count);
        info!(path, count, ?mode, "Loading vectors from file");

        let job = BatchJob { keys, vectors };
        match mode {
            LoadMode::Background => {
                self.spawn_job(claim, job)?;
                Ok(count)
            }
            LoadMode::Blocking => match self.shared.run_job(&claim, job) {
                JobOutcome::Completed(count) => Ok(count),
                JobOutcome::Failed(message) => {
                    // Reported here, so not again through `last_result`.
                    self.shared.lock_recovered().record.clear_error();
                    Err(IndexError::BatchFailed(message))
                }
                JobOutcome::Aborted => Err(IndexError::Released),
            },
        }
    }

    pub fn save(&self, path: &str) -> Result<(), IndexError> {
        let path = sanitize_path(path)?;
        self.locked(|engine| {
            engine.save(path).map_err(|e| IndexError::Persistence {
                path: path.to_string(),
                message: e.to_string(),
            })?;
            info!(path, vectors = engine.size(), "Saved vector index");
            Ok(())
        })
    }

    /// Replace the contents with the index stored at `path`.
    pub fn load(&self, path: &str) -> Result<(), IndexError> {
        let path = sanitize_path(path)?;
        self.locked(|engine| {
            engine.load(path).map_err(|e| IndexError::Persistence {
                path: path.to_string(),
                message: e.to_string(),
            })?;
            info!(path, vectors = engine.size(), "Loaded vector index");
            Ok(())
        })
    }

    /// Destroy the engine. Idempotent.
    pub fn release(&self) {
        if self.shared.lock_recovered().engine.take().is_some() {
            info!("Released vector index");
        }
    }

    pub fn is_released(&self) -> bool {
        self.shared.lock_recovered().engine.is_none()
    }

    pub fn is_indexing(&self) -> bool {
        self.shared.progress.is_running()
    }

    pub fn progress(&self) -> IndexingProgress {
        self.shared.progress.snapshot()
    }

    /// Outcome of the last completed batch job.
    ///
    /// A failed job's error is returned once, then cleared.
    pub fn last_result(&self) -> Result<BatchReport, IndexError> {
        let mut slot = self.shared.lock()?;
        if slot.engine.is_none() {
            return Err(IndexError::Released);
        }
        slot.record.take().map_err(IndexError::BatchFailed)
    }

    pub fn len(&self) -> Result<usize, IndexError> {
        self.locked(|engine| Ok(engine.size()))
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        self.len().map(|n| n == 0)
    }

    pub fn capacity(&self) -> Result<usize, IndexError> {
        self.locked(|engine| Ok(engine.capacity()))
    }

    /// SIMD instruction set used by the engine.
    pub fn isa(&self) -> Result<String, IndexError> {
        self.locked(|engine| Ok(engine.isa_name()))
    }

    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        let (count, metric_name) =
            self.locked(|engine| Ok((engine.size(), engine.metric_name())))?;
        let dims = self.shared.dimensions;
        let estimated_memory_bytes = count * dims * self.shared.precision.bytes_per_scalar()
            + count * ENTRY_OVERHEAD_BYTES
            + BASE_OVERHEAD_BYTES;
        Ok(IndexStats {
            dimensions: dims,
            count,
            metric_name: metric_name.to_string(),
            estimated_memory_bytes,
        })
    }
}

impl<E: AnnEngine> Drop for IndexManager<E> {
    fn drop(&mut self) {
        self.release();
    }
}
