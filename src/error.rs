//! Crate-wide error type.
//!
//! Every fallible public operation returns [`EngineResult<T>`]. The variants
//! mirror the error taxonomy in the specification: some are terminal
//! (`SchemaMismatch`, `StorageCorrupt`, `PoolExhausted`), some are transient
//! and meant to be retried by the caller (`StorageLocked`), and `Cancelled`
//! is never really a failure — callers that requested cancellation should
//! treat it as a normal outcome.

use std::path::PathBuf;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error("access denied: {path}")]
    AccessDenied { path: PathBuf },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage locked, retry with backoff")]
    StorageLocked,

    #[error("schema mismatch: on-disk version {on_disk}, expected {expected}")]
    SchemaMismatch { on_disk: i64, expected: i64 },

    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("string pool exhausted (>= 2^31 interned strings)")]
    PoolExhausted,

    #[error("indexing already in progress")]
    AlreadyInProgress,

    #[error("persistence layer not initialized")]
    NotInitialized,
}

impl From<std::io::Error> for EngineError {
    fn from(source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => EngineError::AccessDenied {
                path: PathBuf::new(),
            },
            _ => EngineError::Io { path: None, source },
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(source: rusqlite::Error) -> Self {
        match &source {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                EngineError::StorageLocked
            }
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::DatabaseCorrupt =>
            {
                EngineError::StorageCorrupt(msg.clone().unwrap_or_else(|| source.to_string()))
            }
            _ => EngineError::StorageCorrupt(source.to_string()),
        }
    }
}

impl From<regex::Error> for EngineError {
    fn from(source: regex::Error) -> Self {
        EngineError::InvalidInput(format!("invalid regex: {source}"))
    }
}
