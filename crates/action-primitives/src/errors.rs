//! Error types for DOM primitives

use callwarden_core_types::WardenError;
use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The element reference no longer resolves to a node in the document
    #[error("Element detached: {0}")]
    Detached(String),

    /// Element has no clickable area (zero size or not rendered)
    #[error("Element not clickable: {0}")]
    NotClickable(String),

    /// The hosting page went away (tab closed or navigated)
    #[error("Page gone: {0}")]
    PageGone(String),

    /// Script evaluation raised inside the page
    #[error("Script failed: {0}")]
    Script(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    /// The privileged input relay refused or could not be reached
    #[error("Native input unavailable: {0}")]
    NativeInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Errors after which nothing else can be done on this page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActionError::PageGone(_))
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let text = err.to_string();
        match err.kind {
            AdapterErrorKind::PageNotFound => ActionError::PageGone(text),
            AdapterErrorKind::Script => ActionError::Script(text),
            AdapterErrorKind::Internal => ActionError::Internal(text),
            _ => ActionError::CdpIo(text),
        }
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::Internal(format!("unexpected script result: {err}"))
    }
}

impl From<ActionError> for WardenError {
    fn from(err: ActionError) -> Self {
        WardenError::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_page_loss_maps_to_fatal() {
        let err: ActionError = AdapterError::new(AdapterErrorKind::PageNotFound)
            .with_hint("p1")
            .into();
        assert!(err.is_fatal());
    }

    #[test]
    fn io_errors_are_not_fatal() {
        let err: ActionError = AdapterError::new(AdapterErrorKind::CdpIo).into();
        assert!(matches!(err, ActionError::CdpIo(_)));
        assert!(!err.is_fatal());
    }
}
