use std::path::PathBuf;

use thiserror::Error;

use crate::config::BackendKind;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Dimension metadata could not be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The backing engine could not be reached or opened.
    #[error("failed to connect to {backend} warehouse: {message}")]
    Connectivity {
        backend: BackendKind,
        message: String,
    },

    /// The connection descriptor or environment was unusable.
    #[error("invalid warehouse configuration: {0}")]
    InvalidConfig(String),

    /// Query parameters were rejected before reaching the engine.
    #[error("query rejected: {0}")]
    InvalidQuery(String),

    /// A fact referenced a dimension id that is not stored.
    #[error("dimension {0} does not exist")]
    UnknownDimension(i64),

    /// Period boundaries could not be computed or parsed.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// No retail source file was supplied and none of the defaults exist.
    #[error("no retail data file found (tried: {})", .tried.join(", "))]
    SourceNotFound { tried: Vec<String> },

    /// The retail source file has an extension we cannot read.
    #[error("unsupported retail data format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}
