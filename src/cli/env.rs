use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;
use super::output::LogFormat;

#[derive(Parser)]
#[command(author, version, long_version = LONG_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Settings file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Human, global = true)]
    pub log_format: LogFormat,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CALLWARDEN_GIT_HASH"),
    " ",
    env!("CALLWARDEN_BUILD_DATE"),
    ")"
);
