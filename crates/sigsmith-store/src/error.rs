use std::path::PathBuf;

use thiserror::Error;

/// Persistence failures. Every variant carries the operation and key in
/// flight so the caller can decide to retry or skip; a failed upsert never
/// poisons anything beyond itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("schema initialization failed: {0}")]
    Schema(rusqlite::Error),

    #[error("{op} failed for key '{key}': {source}")]
    Keyed {
        op: &'static str,
        key: String,
        source: rusqlite::Error,
    },

    #[error("{op} failed: {source}")]
    Query {
        op: &'static str,
        source: rusqlite::Error,
    },

    #[error("corrupt {column} column for key '{key}': {source}")]
    Decode {
        column: &'static str,
        key: String,
        source: serde_json::Error,
    },

    #[error("unknown signature format '{0}' in database")]
    UnknownFormat(String),
}

impl StoreError {
    pub(crate) fn keyed(
        op: &'static str,
        key: impl Into<String>,
    ) -> impl FnOnce(rusqlite::Error) -> StoreError {
        let key = key.into();
        move |source| StoreError::Keyed { op, key, source }
    }

    pub(crate) fn query(op: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| StoreError::Query { op, source }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
