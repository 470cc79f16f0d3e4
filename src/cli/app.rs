use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_settings, LoadedSettings};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(
        &cli.log_level,
        cli.debug,
        cli.log_format,
        cli.log_dir.as_deref(),
    )?;

    info!("Starting callwarden v{}", env!("CARGO_PKG_VERSION"));

    let LoadedSettings { settings, path } = load_settings(cli.config.as_ref()).await?;
    let ctx = CliContext::new(settings, path);

    match dispatch(&cli, &ctx).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
