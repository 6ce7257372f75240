//! `createIndex` entry point.

use serde::{Deserialize, Serialize};
use tracing::info;

use vecdex_index::{IndexConfig, IndexError, IndexManager, Metric, Precision};
use vecdex_types::Settings;

use crate::handle::IndexHandle;

/// Options accepted by [`create_index`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOptions {
    /// `"f32"` (default) or `"i8"`
    pub quantization: Option<String>,
    /// `"cosine"` (default), `"l2sq"`, `"ip"`, `"hamming"` or `"jaccard"`
    pub metric: Option<String>,
}

fn parse_option<T>(value: Option<&str>) -> Result<T, IndexError>
where
    T: std::str::FromStr<Err = vecdex_types::TypesError> + Default,
{
    match value {
        Some(value) => value
            .parse()
            .map_err(|e: vecdex_types::TypesError| IndexError::InvalidArgument(e.to_string())),
        None => Ok(T::default()),
    }
}

/// Create an index of `dimensions` components. Unknown option strings fail
/// with `InvalidArgument`.
pub fn create_index(
    dimensions: usize,
    options: Option<&CreateOptions>,
) -> Result<IndexHandle, IndexError> {
    let metric: Metric = parse_option(options.and_then(|o| o.metric.as_deref()))?;
    let precision: Precision = parse_option(options.and_then(|o| o.quantization.as_deref()))?;
    let config = IndexConfig::new(dimensions)
        .with_metric(metric)
        .with_precision(precision);
    create_index_with_config(config)
}

/// Create an index from explicit engine parameters.
pub fn create_index_with_config(config: IndexConfig) -> Result<IndexHandle, IndexError> {
    let manager = IndexManager::create(config)?;
    info!(
        dims = manager.dimensions(),
        metric = %manager.metric(),
        precision = %manager.precision(),
        "Created index handle"
    );
    Ok(IndexHandle::new(manager))
}

/// Engine parameters from layered settings.
pub fn config_from_settings(settings: &Settings) -> Result<IndexConfig, IndexError> {
    let invalid = |e: vecdex_types::TypesError| IndexError::InvalidArgument(e.to_string());
    Ok(IndexConfig::new(settings.dimensions)
        .with_metric(settings.metric_kind().map_err(invalid)?)
        .with_precision(settings.precision().map_err(invalid)?)
        .with_connectivity(settings.connectivity)
        .with_expansion(settings.expansion_add, settings.expansion_search)
        .with_initial_capacity(settings.initial_capacity))
}
