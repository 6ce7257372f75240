//! Error types for shared vecdex types.

use thiserror::Error;

/// Errors raised while parsing shared types or loading configuration.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
