use callwarden_core_types::WardenError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("quota exceeded writing '{key}': {size} bytes over the {limit} byte limit")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },
    #[error("storage i/o: {0}")]
    Io(String),
    #[error("stored value malformed: {0}")]
    Serde(String),
    #[error("invalid meeting url: {0}")]
    InvalidUrl(String),
    #[error("meeting time {0} is not in the future")]
    NotInFuture(i64),
    #[error("config update must be a JSON object")]
    InvalidUpdate,
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        WardenError::new(err.to_string())
    }
}
