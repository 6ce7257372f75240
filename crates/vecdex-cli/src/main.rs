//! vecdex: build and query approximate-nearest-neighbor indexes.
//!
//! # Usage
//!
//! ```bash
//! vecdex convert --input vectors.json --output vectors.bin
//! vecdex build --input vectors.bin --output index.usearch --dimensions 384
//! vecdex query --index index.usearch --vector "0.1,0.2,..." -k 5
//! vecdex stats --index index.usearch
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/vecdex/config.toml)
//! 3. Environment variables (VECDEX_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use vecdex_cli::{
    build_index, convert_json, index_stats, init_logging, load_settings, parse_keys,
    parse_vector, query_index, show_config, Cli, Commands, IndexArgs,
};

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Build {
            input,
            output,
            shape,
            blocking,
        } => {
            let settings = load_settings(config, log_level, &shape)?;
            init_logging(&settings.log_level)?;
            let summary = build_index(&settings, &input, output.as_deref(), blocking).await?;
            print_json(&summary)?;
        }
        Commands::Query {
            index,
            vector,
            k,
            allowed,
            mut shape,
        } => {
            let vector = parse_vector(&vector)?;
            shape.dimensions.get_or_insert(vector.len());
            let settings = load_settings(config, log_level, &shape)?;
            init_logging(&settings.log_level)?;
            let allowed = allowed.as_deref().map(parse_keys).transpose()?;
            let matches = query_index(&settings, index.as_deref(), &vector, k, allowed.as_deref())?;
            print_json(&matches)?;
        }
        Commands::Stats { index, shape } => {
            let settings = load_settings(config, log_level, &shape)?;
            init_logging(&settings.log_level)?;
            print_json(&index_stats(&settings, index.as_deref())?)?;
        }
        Commands::Convert { input, output } => {
            let settings = load_settings(config, log_level, &IndexArgs::default())?;
            init_logging(&settings.log_level)?;
            print_json(&convert_json(&input, &output)?)?;
        }
        Commands::Config => {
            let settings = load_settings(config, log_level, &IndexArgs::default())?;
            print!("{}", show_config(&settings)?);
        }
    }

    Ok(())
}
