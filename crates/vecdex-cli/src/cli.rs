//! CLI argument parsing for `vecdex`.
//!
//! CLI flags override all other config sources.

use clap::{Args, Parser, Subcommand};

/// Build, query and inspect vecdex vector indexes.
#[derive(Parser, Debug)]
#[command(name = "vecdex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/vecdex/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Index shape overrides shared by commands that create an index.
#[derive(Args, Debug, Clone, Default)]
pub struct IndexArgs {
    /// Components per vector
    #[arg(short, long)]
    pub dimensions: Option<usize>,

    /// Distance metric (cos, l2sq, ip, hamming, jaccard)
    #[arg(short, long)]
    pub metric: Option<String>,

    /// Scalar quantization (f32, i8)
    #[arg(short, long)]
    pub quantization: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an index from a raw little-endian f32 vector file
    Build {
        /// Raw vector file (dimensions x 4 bytes per record)
        #[arg(short, long)]
        input: String,

        /// Index file to write (default from config)
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        shape: IndexArgs,

        /// Insert on the main thread instead of a background job
        #[arg(long)]
        blocking: bool,
    },

    /// Search an index for the nearest neighbors of a vector
    Query {
        /// Index file (default from config)
        #[arg(long)]
        index: Option<String>,

        /// Comma-separated query vector, e.g. "0.1,0.2,0.3"
        #[arg(long, allow_hyphen_values = true)]
        vector: String,

        /// Number of results
        #[arg(short, default_value_t = 10)]
        k: usize,

        /// Comma-separated keys results are restricted to
        #[arg(long)]
        allowed: Option<String>,

        #[command(flatten)]
        shape: IndexArgs,
    },

    /// Print statistics for an index file
    Stats {
        /// Index file (default from config)
        #[arg(long)]
        index: Option<String>,

        #[command(flatten)]
        shape: IndexArgs,
    },

    /// Convert a JSON array of vectors into the raw f32 format
    Convert {
        /// JSON file: `[[...], ...]` or `[{"vector": [...]}, ...]`
        #[arg(short, long)]
        input: String,

        /// Raw vector file to write
        #[arg(short, long)]
        output: String,
    },

    /// Print the effective configuration as TOML
    Config,
}
