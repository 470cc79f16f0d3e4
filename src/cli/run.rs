use std::sync::Arc;

use anyhow::{Context, Result};
use callwarden_call_flow::{MeetingRef, SessionEnd, SessionSummary};
use cdp_adapter::{Cdp, CdpAdapter};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use super::context::CliContext;
use super::schedule::parse_meeting_time;
use crate::session::SessionRunner;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Meeting URL to open
    pub url: String,

    /// Scheduled start this run belongs to, so the meeting is marked completed on exit
    #[arg(long)]
    pub time: Option<String>,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    Url::parse(&args.url).with_context(|| format!("invalid meeting URL {}", args.url))?;
    let scheduled_time = args.time.as_deref().map(parse_meeting_time).transpose()?;

    let settings = ctx.settings();
    let roles = Arc::new(settings.role_map().context("loading role map")?);
    let cdp = Arc::new(CdpAdapter::new(settings.cdp_config()));
    cdp.start().await.context("starting the browser")?;
    let dyn_cdp: Arc<dyn Cdp> = cdp.clone();

    let (host, _fired) = ctx.local_host(Some(dyn_cdp.clone())).await?;
    let runner = SessionRunner::new(
        dyn_cdp,
        host.bus().clone(),
        roles,
        settings.timings.flow(),
        settings.chat_texts(),
        settings.timings.click_policy(),
    );

    let stop = CancellationToken::new();
    let interrupt = stop.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; leaving the session");
            interrupt.cancel();
        }
    });

    let meeting = MeetingRef {
        url: args.url.clone(),
        scheduled_time,
    };
    info!(url = %meeting.url, ?scheduled_time, "opening meeting");
    let outcome = runner.open(meeting, cdp.subscribe(), stop).await;

    ctrl_c.abort();
    host.shutdown().await;
    cdp.shutdown().await;

    let summary = outcome.context("session failed")?;
    report(&summary);
    Ok(())
}

fn report(summary: &SessionSummary) {
    println!(
        "Joined after {} attempt(s){}",
        summary.join.attempts,
        if summary.greeted { ", greeted the chat" } else { "" }
    );
    match &summary.end {
        SessionEnd::Exited(record) => println!(
            "Left: {} ({:?}{})",
            record.reason.as_str(),
            record.leave,
            if record.farewell_sent { ", said goodbye" } else { "" }
        ),
        SessionEnd::Stopped => println!("Stopped before the exit condition was met"),
        SessionEnd::PageGone => println!("The meeting tab went away"),
    }
}
