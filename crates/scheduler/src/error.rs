use callwarden_config_store::StoreError;
use callwarden_core_types::WardenError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("alarm name '{0}' does not encode a meeting")]
    InvalidAlarmName(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SchedulerError> for WardenError {
    fn from(value: SchedulerError) -> Self {
        WardenError::new(format!("scheduler error: {value}"))
    }
}
