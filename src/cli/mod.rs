pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod daemon;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod roles;
pub mod run;
pub mod runtime;
pub mod schedule;
pub mod simulate;
pub mod toggle;

pub use config::{parse_cli_value, ConfigAction, ConfigArgs};
pub use schedule::parse_meeting_time;
