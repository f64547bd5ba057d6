//! Error handling for the zooid-test binary

use thiserror::Error;
use zooid_core::{ConfigError, IdentityError};

/// Errors that stop a run before or after the scenarios execute
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No scenario matches filters: {}", .filters.join(", "))]
    NoScenarios { filters: Vec<String> },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
