//! Alarm loop: turns fired alarms into meeting tabs and runs the retention sweep.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callwarden_call_flow::MeetingRef;
use callwarden_scheduler::{AlarmAction, FiredAlarm, MeetingKey, SchedulerGateway};
use cdp_adapter::CdpAdapter;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::session::SessionRunner;

/// Opens a tab for a meeting whose alarm fired.
#[async_trait]
pub trait MeetingLauncher: Send + Sync {
    async fn launch(&self, meeting: MeetingRef);
}

/// Drains fired alarms until `cancel` fires or the facility is gone. Returns the number
/// of meetings launched.
pub async fn drive_alarms(
    gateway: Arc<SchedulerGateway>,
    mut fired: mpsc::UnboundedReceiver<FiredAlarm>,
    launcher: Arc<dyn MeetingLauncher>,
    cancel: CancellationToken,
) -> usize {
    let mut launched = 0;
    loop {
        let alarm = tokio::select! {
            _ = cancel.cancelled() => break,
            next = fired.recv() => match next {
                Some(alarm) => alarm,
                None => break,
            },
        };
        let late_ms = alarm.fired_at_ms - alarm.scheduled_for_ms;
        match gateway.resolve(&alarm).await {
            Ok(AlarmAction::OpenMeeting(MeetingKey { url, scheduled_time })) => {
                info!(%url, scheduled_time, late_ms, "meeting alarm fired");
                launcher
                    .launch(MeetingRef {
                        url,
                        scheduled_time: Some(scheduled_time),
                    })
                    .await;
                launched += 1;
            }
            Ok(AlarmAction::Swept(removed)) => info!(removed, "retention sweep done"),
            Err(err) => warn!(name = %alarm.name, %err, "ignoring alarm"),
        }
    }
    launched
}

/// Launches each meeting in a new browser tab with its own session task. A meeting
/// already running is not opened twice.
pub struct TabLauncher {
    runner: SessionRunner,
    cdp: Arc<CdpAdapter>,
    active: Arc<DashMap<String, JoinHandle<()>>>,
    stop: CancellationToken,
}

impl TabLauncher {
    pub fn new(runner: SessionRunner, cdp: Arc<CdpAdapter>, stop: CancellationToken) -> Self {
        Self {
            runner,
            cdp,
            active: Arc::new(DashMap::new()),
            stop,
        }
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Stops every session and waits up to `grace` for each to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        self.stop.cancel();
        let keys: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.active.remove(&key) {
                if tokio::time::timeout(grace, handle).await.is_err() {
                    warn!(meeting = %key, "session did not stop in time");
                }
            }
        }
    }
}

#[async_trait]
impl MeetingLauncher for TabLauncher {
    async fn launch(&self, meeting: MeetingRef) {
        let key = match meeting.scheduled_time {
            Some(time) => MeetingKey::new(&meeting.url, time).alarm_name(),
            None => meeting.url.clone(),
        };
        if let Some(running) = self.active.get(&key) {
            if !running.is_finished() {
                info!(meeting = %key, "session already running");
                return;
            }
        }

        let runner = self.runner.clone();
        let events = self.cdp.subscribe();
        let stop = self.stop.child_token();
        let active = self.active.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            match runner.open(meeting, events, stop).await {
                Ok(summary) => info!(meeting = %task_key, greeted = summary.greeted, "session done"),
                Err(err) => error!(meeting = %task_key, %err, "session failed"),
            }
            active.remove(&task_key);
        });
        self.active.insert(key, handle);
    }
}
