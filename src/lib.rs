//! callwarden library
//!
//! The background handler, browser session wiring and CLI, exposed for integration
//! testing.

pub mod background;
pub mod cli;
pub mod daemon;
pub mod errors;
pub mod host;
pub mod session;
pub mod settings;
pub mod simulate;

pub use background::Background;
pub use daemon::{drive_alarms, MeetingLauncher, TabLauncher};
pub use errors::HostError;
pub use host::LocalHost;
pub use session::{BusHost, BusNativeInput, SessionRunner};
pub use settings::Settings;
pub use simulate::{simulate_counts, SimulationReport};
