//! # vecdex-host
//!
//! Host-facing surface of a vecdex index: the `create_index` factory and the
//! `IndexHandle` it returns. Vectors cross the boundary as typed arrays
//! (`Float32Array`, `Int32Array`) and are read in place after alignment and
//! bounds checks.

pub mod factory;
pub mod handle;
pub mod typed_array;

pub use factory::{config_from_settings, create_index, create_index_with_config, CreateOptions};
pub use handle::{AddResult, IndexHandle, SearchOptions};
pub use typed_array::{ArrayBuffer, Float32Array, Int32Array, TypedArray};
pub use vecdex_index::{BatchReport, IndexError, IndexStats, IndexingProgress, Key, LoadMode, SearchMatch};
