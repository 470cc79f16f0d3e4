//! Per-tab call automation.
//!
//! A [`CallFlow`] owns one meeting tab: the [`JoinPipeline`] mutes the devices and gets
//! through the join control, then the [`ExitMonitor`] watches the participant counter
//! or a timer and runs the leave sequence once its predicate holds. Everything outside
//! the tab is reached through [`SessionHost`].

pub mod errors;
mod flow;
mod host;
mod join;
mod monitor;
mod page;
mod predicate;
mod session;
mod timings;

pub use errors::FlowError;
pub use flow::{CallFlow, CallFlowBuilder, SessionEnd, SessionSummary};
pub use host::SessionHost;
pub use join::{JoinPipeline, JoinReport, JoinState};
pub use monitor::{ExitMonitor, ExitRecord, LeaveOutcome, MeetingRef};
pub use page::{CallPage, SessionLog, DEBUG_OVERLAY, EXIT_INFO_OVERLAY};
pub use predicate::{ExitPredicate, ExitReason};
pub use session::{parse_count, CallSession};
pub use timings::{ChatTexts, FlowTimings};
