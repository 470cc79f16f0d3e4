use callwarden_core_types::WardenError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("background is not running")]
    Disconnected,
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
}

impl MessageError {
    pub(crate) fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        MessageError::InvalidPayload {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<MessageError> for WardenError {
    fn from(err: MessageError) -> Self {
        WardenError::new(err.to_string())
    }
}
