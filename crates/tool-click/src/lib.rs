pub mod api;
pub mod errors;
pub mod model;
pub mod policy;
pub mod strategies;

mod metrics;
mod runner;

pub use api::{ActionExecutor, ActionExecutorBuilder};
pub use errors::ClickError;
pub use metrics::ClickMetricsSnapshot;
pub use model::{AttemptOutcome, AttemptRecord, ClickReport, Verification};
pub use policy::ClickPolicy;
pub use strategies::{ClickDeps, ClickStrategy, DomActivate, NativeClick, PointerSequence};
