//! Error types for context-align

use thiserror::Error;

/// Errors that can occur during alignment, resampling and labeling
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Duplicate (time, entity) pair: time={time}, entity={entity}")]
    DuplicateKeyError { time: f64, entity: String },

    #[error("Unknown session: {0}")]
    UnknownSessionError(String),

    #[error("Empty input: {0}")]
    EmptyInputError(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
