//! vecdex command-line library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (build, query, stats, convert, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, IndexArgs};
pub use commands::{
    build_index, convert_json, index_stats, init_logging, load_settings, parse_keys,
    parse_vector, query_index, show_config, BuildSummary, ConvertSummary,
};
