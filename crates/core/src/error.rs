//! Crate-wide error type.
//!
//! Everything that crosses the public API boundary returns [`CoreError`]; purely
//! internal helpers that only ever fail with a message may still return
//! `Result<T, String>` where that is simpler, matching the shape of file-local
//! parsing helpers elsewhere in this crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from {provider}: {detail}")]
    InvalidResponse { provider: String, detail: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0} is already running")]
    DuplicateStart(&'static str),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("no such collection: {0}")]
    MissingCollection(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
