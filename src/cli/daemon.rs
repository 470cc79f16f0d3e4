use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cdp_adapter::{Cdp, CdpAdapter};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::context::CliContext;
use crate::daemon::{drive_alarms, MeetingLauncher, TabLauncher};
use crate::session::SessionRunner;

#[derive(Args, Clone, Debug)]
pub struct DaemonArgs {
    /// Seconds running sessions get to wind down on shutdown
    #[arg(long, default_value_t = 10)]
    pub grace_secs: u64,
}

pub async fn cmd_daemon(args: DaemonArgs, ctx: &CliContext) -> Result<()> {
    let settings = ctx.settings();
    let roles = Arc::new(settings.role_map().context("loading role map")?);
    let cdp = Arc::new(CdpAdapter::new(settings.cdp_config()));
    cdp.start().await.context("starting the browser")?;
    let dyn_cdp: Arc<dyn Cdp> = cdp.clone();

    let (host, fired) = ctx.local_host(Some(dyn_cdp.clone())).await?;
    let gateway = host.gateway().clone();
    let restored = gateway.restore().await.context("restoring alarms")?;
    info!(restored, store = %settings.store.path.display(), "daemon ready");

    let runner = SessionRunner::new(
        dyn_cdp,
        host.bus().clone(),
        roles,
        settings.timings.flow(),
        settings.chat_texts(),
        settings.timings.click_policy(),
    );
    let sessions_stop = CancellationToken::new();
    let launcher = Arc::new(TabLauncher::new(runner, cdp.clone(), sessions_stop));
    let cancel = CancellationToken::new();
    let driver = tokio::spawn(drive_alarms(
        gateway,
        fired,
        launcher.clone() as Arc<dyn MeetingLauncher>,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for the shutdown signal")?;
    info!(active = launcher.active(), "shutting down");
    cancel.cancel();
    launcher
        .shutdown(Duration::from_secs(args.grace_secs))
        .await;
    match driver.await {
        Ok(launched) => info!(launched, "alarm loop stopped"),
        Err(err) => warn!(%err, "alarm loop ended abnormally"),
    }
    host.shutdown().await;
    cdp.shutdown().await;
    cdp_adapter::metrics::log_gathered();
    Ok(())
}
