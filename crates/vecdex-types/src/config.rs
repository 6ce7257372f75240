//! Configuration loading for vecdex.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/vecdex/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;
use crate::metric::{Metric, Precision};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Number of components per vector
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Distance metric name (cos, l2sq, ip, hamming, jaccard)
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Scalar quantization (f32, i8)
    #[serde(default = "default_quantization")]
    pub quantization: String,

    /// Graph connectivity (M parameter)
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// Build-time search depth (ef_construction)
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// Query-time search depth (ef_search)
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,

    /// Entries reserved when an index is created
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// How often background batch progress is polled (ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Default index file used by the CLI
    #[serde(default = "default_index_path")]
    pub index_path: String,
}

fn default_dimensions() -> usize {
    384
}

fn default_metric() -> String {
    Metric::default().as_str().to_string()
}

fn default_quantization() -> String {
    Precision::default().as_str().to_string()
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    128
}

fn default_expansion_search() -> usize {
    64
}

fn default_initial_capacity() -> usize {
    100
}

fn default_poll_interval() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "vecdex")
        .map(|p| p.data_local_dir().join("index.usearch"))
        .unwrap_or_else(|| PathBuf::from("./index.usearch"))
        .to_string_lossy()
        .to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            metric: default_metric(),
            quantization: default_quantization(),
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            initial_capacity: default_initial_capacity(),
            poll_interval_ms: default_poll_interval(),
            log_level: default_log_level(),
            index_path: default_index_path(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/vecdex/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (VECDEX_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "vecdex")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("dimensions", default_dimensions() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("metric", default_metric())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("quantization", default_quantization())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("index_path", default_index_path())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: VECDEX_DIMENSIONS, VECDEX_LOG_LEVEL, VECDEX_POLL_INTERVAL_MS, etc.
        builder = builder.add_source(
            Environment::with_prefix("VECDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.dimensions == 0 {
            return Err(TypesError::Config("dimensions must be > 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(TypesError::Config("poll_interval_ms must be > 0".to_string()));
        }
        self.metric_kind()?;
        self.precision()?;
        Ok(())
    }

    /// Parsed distance metric.
    pub fn metric_kind(&self) -> Result<Metric, TypesError> {
        self.metric.parse()
    }

    /// Parsed scalar precision.
    pub fn precision(&self) -> Result<Precision, TypesError> {
        self.quantization.parse()
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        if let Some(rest) = self.index_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.index_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.dimensions, 384);
        assert_eq!(settings.metric, "cos");
        assert_eq!(settings.quantization, "f32");
        assert_eq!(settings.initial_capacity, 100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert!(settings.dimensions > 0);
        assert!(settings.metric_kind().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vecdex-test.toml");
        std::fs::write(&path, "dimensions = 3\nmetric = \"l2sq\"\nquantization = \"i8\"\n").unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.dimensions, 3);
        assert_eq!(settings.metric_kind().unwrap(), Metric::L2Squared);
        assert_eq!(settings.precision().unwrap(), Precision::Quantized);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.dimensions = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.metric = "manhattan".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.poll_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_toml_roundtrip() {
        let settings = Settings::default();
        let encoded = toml::to_string(&settings).unwrap();
        let decoded: Settings = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.dimensions, settings.dimensions);
        assert_eq!(decoded.index_path, settings.index_path);
    }

    #[test]
    fn test_expanded_index_path_absolute() {
        let settings = Settings {
            index_path: "/var/lib/vecdex/index.usearch".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.expanded_index_path(),
            PathBuf::from("/var/lib/vecdex/index.usearch")
        );
    }
}
