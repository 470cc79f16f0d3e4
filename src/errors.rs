//! Errors raised by the host runtime.

use callwarden_config_store::StoreError;
use callwarden_core_types::WardenError;
use callwarden_event_bus::MessageError;
use callwarden_scheduler::SchedulerError;
use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum HostError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("browser: {0}")]
    Browser(#[from] AdapterError),
    #[error("native input unavailable: {0}")]
    NativeInput(String),
    #[error("{0} is a notification, not a request")]
    NotARequest(&'static str),
    #[error("background refused the request: {0}")]
    Refused(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<HostError> for WardenError {
    fn from(err: HostError) -> Self {
        WardenError::new(err.to_string())
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::Malformed(err.to_string())
    }
}
