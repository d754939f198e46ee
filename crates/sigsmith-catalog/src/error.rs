use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while fetching or parsing the technique catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bundle parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Two records in a single fetched bundle share an external id. The
    /// whole batch is rejected rather than silently picking one.
    #[error("duplicate technique id '{0}' in catalog bundle")]
    DuplicateId(String),

    #[error("catalog cache not found at {0} (fetch with a refresh policy first)")]
    MissingCache(PathBuf),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
