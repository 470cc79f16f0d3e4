use thiserror::Error;

use action_primitives::ActionError;
use callwarden_core_types::WardenError;

#[derive(Debug, Error, Clone)]
pub enum ClickError {
    /// Every strategy ran; none raised an effect the verification could see.
    #[error("click had no effect after {} attempt(s): {}", attempts.len(), attempts.join(", "))]
    Ineffective { attempts: Vec<String> },
    #[error("no click strategies configured")]
    NoStrategies,
    /// The page went away mid-escalation.
    #[error(transparent)]
    Dom(#[from] ActionError),
}

impl ClickError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClickError::Dom(err) if err.is_fatal())
    }
}

impl From<ClickError> for WardenError {
    fn from(err: ClickError) -> Self {
        WardenError::new(err.to_string())
    }
}
