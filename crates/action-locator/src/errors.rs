//! Error types for locator system

use action_primitives::ActionError;
use callwarden_core_types::WardenError;
use thiserror::Error;

/// Locator error enumeration. Not finding an element is not an error.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Role map failed to parse or is incomplete
    #[error("Invalid role map: {0}")]
    InvalidRoleMap(String),

    /// Role map declares a schema version this build cannot read
    #[error("Unsupported role map version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Role map I/O: {0}")]
    Io(String),

    /// Underlying page access failed
    #[error(transparent)]
    Dom(#[from] ActionError),
}

impl LocatorError {
    /// The page is gone; further lookups on it are pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LocatorError::Dom(err) if err.is_fatal())
    }
}

impl From<LocatorError> for WardenError {
    fn from(err: LocatorError) -> Self {
        WardenError::new(err.to_string())
    }
}
