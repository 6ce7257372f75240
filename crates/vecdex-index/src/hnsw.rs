//! HNSW engine backed by usearch.
//!
//! Defaults favour small on-device indexes:
//! - M = 16 (connections per layer)
//! - ef_construction = 128 (build-time quality)
//! - ef_search = 64 (search-time quality)

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};

use tracing::{debug, warn};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};
use vecdex_types::{Metric, Precision};

use crate::engine::{AnnEngine, Key, SearchMatch};
use crate::error::EngineError;
use crate::filter::AllowList;

/// A component counts as "set" for binary metrics above this value.
const BINARY_THRESHOLD: f32 = 0.5;

/// Saved indexes open with the vector matrix size: row count and bytes per
/// row, both little-endian u32.
const MATRIX_PREFIX_LEN: u64 = 8;

/// Magic at the start of the index header that follows the vector matrix.
const HEADER_MAGIC: &[u8] = b"usearch";

/// Header bytes holding the metric kind and the scalar kind.
const METRIC_KIND_OFFSET: usize = 13;
const SCALAR_KIND_OFFSET: usize = 14;

/// Index configuration, fixed for the lifetime of an index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Components per vector
    pub dimensions: usize,
    /// Distance metric
    pub metric: Metric,
    /// Scalar storage precision
    pub precision: Precision,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Entries reserved at creation
    pub initial_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            metric: Metric::Cosine,
            precision: Precision::Full,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            initial_capacity: 100,
        }
    }
}

impl IndexConfig {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_connectivity(mut self, m: usize) -> Self {
        self.connectivity = m;
        self
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    fn metric_kind(&self) -> MetricKind {
        match (self.metric, self.precision) {
            (Metric::Cosine, _) => MetricKind::Cos,
            (Metric::L2Squared, _) => MetricKind::L2sq,
            (Metric::InnerProduct, _) => MetricKind::IP,
            (Metric::Hamming, Precision::Quantized) => MetricKind::Hamming,
            (Metric::Jaccard, Precision::Quantized) => MetricKind::Tanimoto,
            // Replaced by a binarized float metric right after construction.
            (Metric::Hamming | Metric::Jaccard, Precision::Full) => MetricKind::IP,
        }
    }

    fn scalar_kind(&self) -> ScalarKind {
        match self.precision {
            Precision::Full => ScalarKind::F32,
            Precision::Quantized => ScalarKind::I8,
        }
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimensions,
            metric: self.metric_kind(),
            quantization: self.scalar_kind(),
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false, // Single vector per key
        }
    }
}

/// `1 - |A ∩ B| / |A ∪ B|` over components binarized at 0.5.
pub fn binary_jaccard(a: &[f32], b: &[f32]) -> f32 {
    let mut intersection = 0u32;
    let mut union = 0u32;
    for (x, y) in a.iter().zip(b) {
        let in_a = *x > BINARY_THRESHOLD;
        let in_b = *y > BINARY_THRESHOLD;
        intersection += u32::from(in_a && in_b);
        union += u32::from(in_a || in_b);
    }
    if union == 0 {
        return 0.0;
    }
    1.0 - intersection as f32 / union as f32
}

/// Count of components whose binarized values differ.
pub fn binary_hamming(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .filter(|(x, y)| (**x > BINARY_THRESHOLD) != (**y > BINARY_THRESHOLD))
        .count() as f32
}

type FloatMetric = Box<dyn Fn(*const f32, *const f32) -> f32 + Send + Sync>;

/// Swap in a binarized metric for full-precision hamming/jaccard indexes.
fn install_binary_metric(index: &mut Index, config: &IndexConfig) {
    if config.precision != Precision::Full || !config.metric.is_binary() {
        return;
    }
    let dims = config.dimensions;
    let kernel: fn(&[f32], &[f32]) -> f32 = match config.metric {
        Metric::Jaccard => binary_jaccard,
        _ => binary_hamming,
    };
    let metric: FloatMetric = Box::new(move |a, b| {
        // SAFETY: usearch calls metrics with two vectors of exactly `dims`
        // scalars of the index's scalar kind, which is f32 here.
        let (a, b) = unsafe {
            (
                std::slice::from_raw_parts(a, dims),
                std::slice::from_raw_parts(b, dims),
            )
        };
        kernel(a, b)
    });
    index.change_metric(metric);
    debug!(metric = %config.metric, dims, "Installed binarized float metric");
}

/// Storage layout recorded in a saved index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoredLayout {
    bytes_per_vector: u32,
    metric_kind: u8,
    scalar_kind: u8,
}

/// Layout of a saved index, `None` if the header is not recognized.
fn read_layout<R: Read + Seek>(reader: &mut R) -> io::Result<Option<StoredLayout>> {
    let mut prefix = [0u8; MATRIX_PREFIX_LEN as usize];
    reader.read_exact(&mut prefix)?;
    let rows = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let bytes_per_vector = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);

    let matrix_len = u64::from(rows) * u64::from(bytes_per_vector);
    reader.seek(SeekFrom::Start(MATRIX_PREFIX_LEN + matrix_len))?;
    let mut head = [0u8; SCALAR_KIND_OFFSET + 1];
    reader.read_exact(&mut head)?;
    if !head.starts_with(HEADER_MAGIC) {
        return Ok(None);
    }
    Ok(Some(StoredLayout {
        bytes_per_vector,
        metric_kind: head[METRIC_KIND_OFFSET],
        scalar_kind: head[SCALAR_KIND_OFFSET],
    }))
}

/// Layout `index` writes when saved, read back from its own serialization.
fn configured_layout(index: &Index) -> Option<StoredLayout> {
    let mut buffer = vec![0u8; index.serialized_length()];
    if let Err(e) = index.save_to_buffer(&mut buffer) {
        warn!(error = %e, "Failed to serialize empty index, stored layout checks disabled");
        return None;
    }
    match read_layout(&mut Cursor::new(buffer)) {
        Ok(Some(layout)) => Some(layout),
        _ => {
            warn!("Unrecognized index header, stored layout checks disabled");
            None
        }
    }
}

fn build_index(config: &IndexConfig) -> Result<Index, EngineError> {
    let mut index = Index::new(&config.options()).map_err(|e| EngineError::new(e.to_string()))?;
    install_binary_metric(&mut index, config);
    Ok(index)
}

/// usearch-backed [`AnnEngine`].
pub struct UsearchEngine {
    index: Index,
    config: IndexConfig,
    /// Layout this configuration saves with, read back from an empty index
    layout: Option<StoredLayout>,
}

impl UsearchEngine {
    pub fn new(config: IndexConfig) -> Result<Self, EngineError> {
        let index = build_index(&config)?;
        let layout = configured_layout(&index);
        Ok(Self {
            index,
            config,
            layout,
        })
    }

    /// Reject a saved index whose metric, precision or dimensions differ
    /// from this engine's configuration.
    fn check_stored_layout(&self, path: &str) -> Result<(), EngineError> {
        let Some(expected) = self.layout else {
            return Ok(());
        };
        let file = File::open(path).map_err(|e| EngineError::new(e.to_string()))?;
        let stored = read_layout(&mut BufReader::new(file))
            .map_err(|e| EngineError::new(format!("unreadable index header: {}", e)))?
            .ok_or_else(|| EngineError::new("unrecognized index header"))?;
        if stored != expected {
            return Err(EngineError::new(format!(
                "stored index layout does not match a {}-dimensional {} {} index",
                self.config.dimensions, self.config.metric, self.config.precision
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn matches(keys: Vec<Key>, distances: Vec<f32>) -> Vec<SearchMatch> {
        keys.into_iter()
            .zip(distances)
            .map(|(key, distance)| SearchMatch::new(key, distance))
            .collect()
    }
}

impl AnnEngine for UsearchEngine {
    fn reserve(&mut self, capacity: usize, threads: usize) -> bool {
        self.index
            .reserve_capacity_and_threads(capacity, threads)
            .is_ok()
    }

    fn add(&mut self, key: Key, vector: &[f32]) -> Result<(), EngineError> {
        self.index
            .add(key, vector)
            .map_err(|e| EngineError::new(e.to_string()))
    }

    fn remove(&mut self, key: Key) -> Result<(), EngineError> {
        let removed = self
            .index
            .remove(key)
            .map_err(|e| EngineError::new(e.to_string()))?;
        if removed == 0 {
            return Err(EngineError::new(format!("key not found: {}", key)));
        }
        Ok(())
    }

    fn get(&self, key: Key, out: &mut [f32]) -> bool {
        matches!(self.index.get(key, out), Ok(found) if found > 0)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchMatch>, EngineError> {
        let results = self
            .index
            .search(query, k)
            .map_err(|e| EngineError::new(e.to_string()))?;
        Ok(Self::matches(results.keys, results.distances))
    }

    fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        filter: &AllowList,
    ) -> Result<Vec<SearchMatch>, EngineError> {
        let results = self
            .index
            .filtered_search(query, k, |key: Key| filter.allows(key))
            .map_err(|e| EngineError::new(e.to_string()))?;
        Ok(Self::matches(results.keys, results.distances))
    }

    fn size(&self) -> usize {
        self.index.size()
    }

    fn capacity(&self) -> usize {
        self.index.capacity()
    }

    fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    fn metric_name(&self) -> &'static str {
        self.config.metric.as_str()
    }

    fn isa_name(&self) -> String {
        self.index.hardware_acceleration()
    }

    fn save(&self, path: &str) -> Result<(), EngineError> {
        self.index
            .save(path)
            .map_err(|e| EngineError::new(e.to_string()))
    }

    fn load(&mut self, path: &str) -> Result<(), EngineError> {
        self.check_stored_layout(path)?;
        let mut fresh =
            Index::new(&self.config.options()).map_err(|e| EngineError::new(e.to_string()))?;
        fresh
            .load(path)
            .map_err(|e| EngineError::new(e.to_string()))?;
        if fresh.dimensions() != self.config.dimensions {
            return Err(EngineError::new(format!(
                "stored index has {} dimensions, expected {}",
                fresh.dimensions(),
                self.config.dimensions
            )));
        }
        // Loading restores the builtin metric from the file header.
        install_binary_metric(&mut fresh, &self.config);
        self.index = fresh;
        Ok(())
    }
}
