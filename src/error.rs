// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoloqError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),
}

pub type Result<T> = std::result::Result<T, SoloqError>;
