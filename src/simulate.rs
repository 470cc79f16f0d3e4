//! Dry run of the exit monitor: an in-memory call whose participant counter walks
//! through a list of counts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_locator::{LocatorRole, RoleMap};
use action_primitives::{ClickEffect, DomPort, FakeElement, InMemoryPage};
use async_trait::async_trait;
use callwarden_call_flow::{
    CallPage, ChatTexts, ExitMonitor, ExitPredicate, FlowTimings, LeaveOutcome,
    MeetingRef, SessionHost, SessionLog,
};
use callwarden_config_store::MeetingConfig;
use callwarden_core_types::{now_ms, WardenError};
use serde::Serialize;
use tool_click::ClickPolicy;
use tracing::debug;

const SIMULATED_URL: &str = "https://meet.google.com/sim-ulat-ion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// `false` when the config arms nothing (automatic exit off).
    pub armed: bool,
    /// Index into the count list of the reading that triggered the exit.
    pub exit_index: Option<usize>,
    pub exit_count: Option<u32>,
    pub reason: Option<String>,
    pub peak: u32,
    /// Number of completions the monitor recorded; never more than one.
    pub completions: usize,
    pub left: bool,
}

/// Feeds `counts` to an armed monitor, one reading per `step`, and reports where it
/// left. Timer mode is rejected: it does not depend on the counts.
pub async fn simulate_counts(
    config: &MeetingConfig,
    counts: &[u32],
    step: Duration,
) -> Result<SimulationReport, WardenError> {
    if matches!(
        ExitPredicate::from_config(config),
        Some(ExitPredicate::Timer { .. })
    ) {
        return Err(WardenError::new(
            "timer mode does not depend on participant counts",
        ));
    }
    let Some((first, rest)) = counts.split_first() else {
        return Err(WardenError::new("no participant counts to simulate"));
    };

    let page = call_page(*first);
    let host = Arc::new(Recorder::default());
    let timings = FlowTimings {
        locate_timeout: step,
        chat_locate_timeout: step,
        chat_attempts: 1,
        tick: step,
        ..FlowTimings::default()
    };
    let dom: Arc<dyn DomPort> = Arc::new(page.clone());
    let call = Arc::new(CallPage::new(
        dom.clone(),
        None,
        Arc::new(RoleMap::builtin()),
        &timings,
        ClickPolicy { settle_ms: 0 },
    ));
    let log = Arc::new(SessionLog::new(dom, host.clone(), false));
    let monitor = ExitMonitor::new(
        call,
        log,
        host.clone(),
        MeetingRef {
            url: SIMULATED_URL.to_string(),
            scheduled_time: None,
        },
        timings,
        ChatTexts::default(),
    );
    monitor.mark_joined(now_ms());

    let armed = monitor.arm(config);
    let mut exit_index = None;
    if armed {
        tokio::time::sleep(step).await;
        if monitor.is_exiting() {
            exit_index = Some(0);
        }
        for (offset, count) in rest.iter().enumerate() {
            if exit_index.is_some() {
                break;
            }
            page.replace_text("counter", count.to_string());
            tokio::time::sleep(step).await;
            if monitor.is_exiting() {
                exit_index = Some(offset + 1);
            }
        }
    }

    let record = match exit_index {
        Some(_) => tokio::time::timeout(step * 20, monitor.wait_for_exit())
            .await
            .ok()
            .flatten(),
        None => None,
    };
    monitor.disarm();
    let session = monitor.session();
    debug!(?record, "simulation finished");
    Ok(SimulationReport {
        armed,
        exit_index,
        exit_count: exit_index.map(|i| counts[i]),
        reason: record.as_ref().map(|r| r.reason.as_str().to_string()),
        peak: session.peak_participants,
        completions: host.completions(),
        left: matches!(record.map(|r| r.leave), Some(LeaveOutcome::Left)),
    })
}

fn call_page(initial: u32) -> InMemoryPage {
    let page = InMemoryPage::new();
    let roles = RoleMap::builtin();
    let first = |role| roles.candidates(role)[0].clone();
    page.insert(
        FakeElement::new("counter")
            .selector(first(LocatorRole::ParticipantCount))
            .text(initial.to_string()),
    );
    page.insert(FakeElement::new("chat-button").selector(first(LocatorRole::ChatButton)));
    page.insert(FakeElement::new("chat-input").selector(first(LocatorRole::ChatInput)));
    page.insert(
        FakeElement::new("leave")
            .selector(first(LocatorRole::LeaveButton))
            .on_click(ClickEffect::Detach),
    );
    page
}

/// Host side of the simulated tab: counts completions, closes nothing.
#[derive(Default)]
struct Recorder {
    completions: AtomicUsize,
}

impl Recorder {
    fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHost for Recorder {
    async fn load_config(&self) -> Result<MeetingConfig, WardenError> {
        Ok(MeetingConfig::default())
    }

    async fn complete_meeting(
        &self,
        _url: &str,
        _scheduled_time: Option<i64>,
        _reason: &str,
    ) -> Result<(), WardenError> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn force_close(&self) -> Result<(), WardenError> {
        Ok(())
    }
}
