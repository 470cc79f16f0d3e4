use thiserror::Error;

use action_primitives::ActionError;
use callwarden_core_types::WardenError;

#[derive(Debug, Error, Clone)]
pub enum TypeTextError {
    #[error("text exceeds max length ({0})")]
    TextTooLong(usize),
    #[error("nothing to submit")]
    Empty,
    #[error(transparent)]
    Dom(#[from] ActionError),
}

impl From<TypeTextError> for WardenError {
    fn from(err: TypeTextError) -> Self {
        WardenError::new(err.to_string())
    }
}
