//! Common error types for freqline

use thiserror::Error;

/// Common result type for freqline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across freqline crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config file could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input data or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
