use anyhow::Result;

use super::commands::Commands;
use super::config::cmd_config;
use super::context::CliContext;
use super::daemon::cmd_daemon;
use super::env::CliArgs;
use super::roles::cmd_roles;
use super::run::cmd_run;
use super::schedule::cmd_schedule;
use super::simulate::cmd_simulate;
use super::toggle::cmd_toggle;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Daemon(args) => cmd_daemon(args, ctx).await,
        Commands::Schedule(args) => cmd_schedule(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
        Commands::Toggle(args) => cmd_toggle(args, ctx).await,
        Commands::Roles(args) => cmd_roles(args, ctx).await,
        Commands::Simulate(args) => cmd_simulate(args, ctx).await,
    }
}
