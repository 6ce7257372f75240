//! # vecdex-types
//!
//! Shared vocabulary for the vecdex crates.
//!
//! - `Metric`: distance function used to rank candidates
//! - `Precision`: scalar storage width (full `f32` or quantized `i8`)
//! - `Settings`: layered configuration (defaults, file, env)

pub mod config;
pub mod error;
pub mod metric;

pub use config::Settings;
pub use error::TypesError;
pub use metric::{Metric, Precision};
