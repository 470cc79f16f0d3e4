use action_locator::{LocatorError, LocatorRole};
use action_primitives::ActionError;
use callwarden_core_types::WardenError;
use thiserror::Error;
use tool_click::ClickError;
use tool_type_text::TypeTextError;

#[derive(Debug, Error, Clone)]
pub enum FlowError {
    #[error("{0} control not found")]
    ControlMissing(LocatorRole),
    #[error("could not mute {role}: {reason}")]
    MuteFailed { role: LocatorRole, reason: String },
    #[error("join control not activated after {attempts} attempt(s)")]
    JoinExhausted { attempts: u32 },
    #[error("page gone: {0}")]
    PageGone(String),
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Click(#[from] ClickError),
    #[error(transparent)]
    Text(#[from] TypeTextError),
    #[error("host call failed: {0}")]
    Host(#[from] WardenError),
}

impl FlowError {
    /// The tab is gone; nothing further can run against it.
    pub fn is_fatal(&self) -> bool {
        match self {
            FlowError::PageGone(_) => true,
            FlowError::Locator(err) => err.is_fatal(),
            FlowError::Click(err) => err.is_fatal(),
            FlowError::Text(TypeTextError::Dom(err)) => err.is_fatal(),
            _ => false,
        }
    }
}

impl From<ActionError> for FlowError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::PageGone(reason) => FlowError::PageGone(reason),
            other => FlowError::Locator(LocatorError::Dom(other)),
        }
    }
}

impl From<FlowError> for WardenError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Host(inner) => inner,
            other => WardenError::new(other.to_string()),
        }
    }
}
