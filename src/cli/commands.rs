use clap::Subcommand;

use super::config::ConfigArgs;
use super::daemon::DaemonArgs;
use super::roles::RolesArgs;
use super::run::RunArgs;
use super::schedule::ScheduleArgs;
use super::simulate::SimulateArgs;
use super::toggle::ToggleArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Open a meeting now and stay until the exit condition is met
    Run(RunArgs),

    /// Keep running, opening scheduled meetings when they are due
    Daemon(DaemonArgs),

    /// Add, list or remove scheduled meetings
    Schedule(ScheduleArgs),

    /// Show or change the meeting configuration
    Config(ConfigArgs),

    /// Switch a configuration flag on or off
    Toggle(ToggleArgs),

    /// Print the effective element role map
    Roles(RolesArgs),

    /// Replay participant counts through the exit monitor
    Simulate(SimulateArgs),
}
