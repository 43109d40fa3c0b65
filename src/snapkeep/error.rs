use crate::snapkeep::database::DatabaseError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, SnapkeepError>;

#[derive(Error, Debug)]
pub enum SnapkeepError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown storage device: {0}")]
    UnknownStorageDevice(String),

    #[error("Invalid status for this operation: {0}")]
    InvalidStatus(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for SnapkeepError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        SnapkeepError::Other(anyhow::anyhow!(err.to_string()))
    }
}
