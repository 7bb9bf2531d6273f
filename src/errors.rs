//! Ingestion error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Decoding error: no candidate encoding yields a ReDIF document")]
    Decoding,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        IngestError::Transport(e.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
