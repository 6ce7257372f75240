//! Command implementations.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::info;

use vecdex_host::{
    config_from_settings, create_index_with_config, BatchReport, IndexHandle, IndexStats, Key,
    LoadMode, SearchMatch,
};
use vecdex_types::Settings;

use crate::cli::IndexArgs;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level: Option<&str>,
    shape: &IndexArgs,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    if let Some(dimensions) = shape.dimensions {
        settings.dimensions = dimensions;
    }
    if let Some(metric) = &shape.metric {
        settings.metric = metric.clone();
    }
    if let Some(quantization) = &shape.quantization {
        settings.quantization = quantization.clone();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn index_path(settings: &Settings, explicit: Option<&str>) -> String {
    match explicit {
        Some(path) => path.to_string(),
        None => settings.expanded_index_path().to_string_lossy().to_string(),
    }
}

fn open_index(settings: &Settings, path: &str) -> Result<IndexHandle> {
    let handle = create_index_with_config(config_from_settings(settings)?)?;
    handle
        .load(path)
        .with_context(|| format!("Failed to load index from {}", path))?;
    Ok(handle)
}

/// Outcome of `vecdex build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    pub output: String,
    pub report: BatchReport,
    pub stats: IndexStats,
}

/// Build an index from a raw vector file and save it.
pub async fn build_index(
    settings: &Settings,
    input: &str,
    output: Option<&str>,
    blocking: bool,
) -> Result<BuildSummary> {
    let output = index_path(settings, output);
    let handle = create_index_with_config(config_from_settings(settings)?)?;

    let mode = if blocking {
        LoadMode::Blocking
    } else {
        LoadMode::Background
    };
    let count = handle
        .load_vectors_from_file(input, mode)
        .with_context(|| format!("Failed to load vectors from {}", input))?;
    info!(input, count, ?mode, "Indexing vectors");

    let mut ticker = interval(Duration::from_millis(settings.poll_interval_ms));
    while handle.is_indexing() {
        ticker.tick().await;
        let progress = handle.indexing_progress();
        info!(
            current = progress.current,
            total = progress.total,
            percent = progress.percentage * 100.0,
            "Indexing progress"
        );
    }
    let report = handle.get_last_result().context("Batch indexing failed")?;

    if let Some(parent) = Path::new(&output).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    handle.save(&output)?;
    info!(output = %output, count = report.count, duration_ms = report.duration_ms, "Index built");

    Ok(BuildSummary {
        output,
        report,
        stats: handle.stats()?,
    })
}

/// Parse a comma-separated list of floats.
pub fn parse_vector(text: &str) -> Result<Vec<f32>> {
    let vector = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("Invalid vector component '{}'", part.trim()))
        })
        .collect::<Result<Vec<f32>>>()?;
    if vector.is_empty() {
        bail!("Query vector is empty");
    }
    Ok(vector)
}

/// Parse a comma-separated list of keys.
pub fn parse_keys(text: &str) -> Result<Vec<Key>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Key>()
                .with_context(|| format!("Invalid key '{}'", part))
        })
        .collect()
}

/// Load an index and search it.
pub fn query_index(
    settings: &Settings,
    index: Option<&str>,
    vector: &[f32],
    k: usize,
    allowed: Option<&[Key]>,
) -> Result<Vec<SearchMatch>> {
    let path = index_path(settings, index);
    let handle = open_index(settings, &path)?;
    let options = allowed.map(|keys| vecdex_host::SearchOptions {
        allowed_keys: Some(keys.to_vec()),
    });
    let query = vecdex_host::Float32Array::from_slice(vector);
    Ok(handle.search(&query, k, options.as_ref())?)
}

/// Load an index and report its statistics.
pub fn index_stats(settings: &Settings, index: Option<&str>) -> Result<IndexStats> {
    let path = index_path(settings, index);
    let handle = open_index(settings, &path)?;
    Ok(handle.stats()?)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonVector {
    Plain(Vec<f32>),
    Record { vector: Vec<f32> },
}

impl JsonVector {
    fn into_vec(self) -> Vec<f32> {
        match self {
            JsonVector::Plain(vector) | JsonVector::Record { vector } => vector,
        }
    }
}

/// Outcome of `vecdex convert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertSummary {
    pub count: usize,
    pub dimensions: usize,
}

/// Convert a JSON array of vectors to raw little-endian f32 records.
pub fn convert_json(input: &str, output: &str) -> Result<ConvertSummary> {
    let text = fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?;
    let vectors: Vec<JsonVector> =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", input))?;

    let Some(first) = vectors.first() else {
        bail!("{} contains no vectors", input);
    };
    let dimensions = match first {
        JsonVector::Plain(v) | JsonVector::Record { vector: v } => v.len(),
    };
    if dimensions == 0 {
        bail!("{} contains an empty vector", input);
    }

    let count = vectors.len();
    let mut bytes = Vec::with_capacity(count * dimensions * 4);
    for (i, vector) in vectors.into_iter().map(JsonVector::into_vec).enumerate() {
        if vector.len() != dimensions {
            bail!(
                "Vector {} has {} dimensions, expected {}",
                i,
                vector.len(),
                dimensions
            );
        }
        bytes.extend(vector.iter().flat_map(|v| v.to_le_bytes()));
    }
    fs::write(output, bytes).with_context(|| format!("Failed to write {}", output))?;
    info!(input, output, count, dimensions, "Converted vectors");

    Ok(ConvertSummary { count, dimensions })
}

/// Effective settings as TOML.
pub fn show_config(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to serialize settings")
}
