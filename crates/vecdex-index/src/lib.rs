//! # vecdex-index
//!
//! Embeddable, thread-safe approximate-nearest-neighbor index manager.
//!
//! Wraps an HNSW engine (usearch) behind a single lock and adds validated
//! zero-copy buffer access, background batch indexing with progress and
//! deferred error delivery, and allow-list filtered search.
//!
//! ## Features
//! - `IndexManager`: add / update / remove / search / persist, safe to share across threads
//! - Background batch jobs with an atomic busy claim and once-only error delivery
//! - `BufferView`: bounds- and alignment-checked views over caller-owned bytes
//! - `sanitize_path`: `file://` stripping and `..` rejection for persistence paths
//! - Cosine, squared L2, inner product, hamming and jaccard metrics; f32 or i8 storage

pub mod batch;
pub mod buffer;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hnsw;
pub mod manager;
pub mod path;

pub use batch::{BatchReport, IndexingProgress};
pub use buffer::{BufferView, Element, RawBuffer};
pub use engine::{AnnEngine, Key, SearchMatch};
pub use error::{EngineError, IndexError};
pub use filter::AllowList;
pub use hnsw::{IndexConfig, UsearchEngine};
pub use manager::{IndexManager, IndexStats, LoadMode};
pub use path::sanitize_path;
pub use vecdex_types::{Metric, Precision};
