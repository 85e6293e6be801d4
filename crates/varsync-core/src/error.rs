use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SyncError {
    #[error("serialization failed: {0}")]
    Json(String),
    #[error("session '{0}' has no synchronization state")]
    UnknownSession(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Json(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
