//! Runs one call session per browser tab, wired to the background over the bus.

use std::sync::Arc;

use action_locator::RoleMap;
use action_primitives::{ActionError, CdpPage, DomPort, NativeInput};
use async_trait::async_trait;
use callwarden_call_flow::{
    CallFlow, ChatTexts, FlowError, FlowTimings, MeetingRef, SessionEnd, SessionHost,
    SessionSummary,
};
use callwarden_config_store::MeetingConfig;
use callwarden_core_types::{PageId, WardenError};
use callwarden_event_bus::{Envelope, MessageBus, MessageType, Request, Response};
use cdp_adapter::{Cdp, RawEvent};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tool_click::ClickPolicy;
use tracing::{debug, info, instrument, warn};

use crate::errors::HostError;

const CONFIG_UPDATES: usize = 8;

/// [`SessionHost`] for a tab: store access goes through the background, tab control
/// through CDP.
pub struct BusHost {
    bus: MessageBus,
    cdp: Arc<dyn Cdp>,
    page: PageId,
}

impl BusHost {
    pub fn new(bus: MessageBus, cdp: Arc<dyn Cdp>, page: PageId) -> Self {
        Self { bus, cdp, page }
    }

    async fn call(&self, request: Request) -> Result<Option<Value>, HostError> {
        let envelope = request.into_envelope().with_sender(self.page.0.clone());
        let Response {
            success,
            data,
            error,
        } = self.bus.send(envelope).await?;
        if success {
            Ok(data)
        } else {
            Err(HostError::Refused(error.unwrap_or_default()))
        }
    }
}

#[async_trait]
impl SessionHost for BusHost {
    async fn load_config(&self) -> Result<MeetingConfig, WardenError> {
        let data = self
            .call(Request::GetConfig)
            .await?
            .ok_or_else(|| HostError::Malformed("GET_CONFIG returned no data".into()))?;
        Ok(serde_json::from_value(data).map_err(HostError::from)?)
    }

    async fn complete_meeting(
        &self,
        url: &str,
        scheduled_time: Option<i64>,
        reason: &str,
    ) -> Result<(), WardenError> {
        self.call(Request::CompleteMeeting {
            url: url.to_string(),
            time: scheduled_time,
            exit_reason: reason.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn force_close(&self) -> Result<(), WardenError> {
        warn!(page = %self.page, "closing the tab");
        Ok(self.cdp.close_page(&self.page).await?)
    }

    async fn debug_log(&self, line: &str) {
        if let Err(err) = self
            .call(Request::DebugLog {
                message: line.to_string(),
            })
            .await
        {
            debug!(%err, "debug line not delivered");
        }
    }
}

/// Trusted clicks requested from the background as `NATIVE_CLICK` with this tab as
/// the sender.
pub struct BusNativeInput {
    bus: MessageBus,
    page: PageId,
}

impl BusNativeInput {
    pub fn new(bus: MessageBus, page: PageId) -> Self {
        Self { bus, page }
    }
}

#[async_trait]
impl NativeInput for BusNativeInput {
    async fn native_click(&self, x: f64, y: f64) -> Result<(), ActionError> {
        let envelope = Request::NativeClick {
            x: x.round() as i64,
            y: y.round() as i64,
        }
        .into_envelope()
        .with_sender(self.page.0.clone());
        let response = self
            .bus
            .send(envelope)
            .await
            .map_err(|err| ActionError::NativeInput(err.to_string()))?;
        if response.success {
            Ok(())
        } else {
            Err(ActionError::NativeInput(
                response.error.unwrap_or_else(|| "native click refused".into()),
            ))
        }
    }
}

/// Everything a session needs besides the tab itself.
#[derive(Clone)]
pub struct SessionRunner {
    cdp: Arc<dyn Cdp>,
    bus: MessageBus,
    roles: Arc<RoleMap>,
    timings: FlowTimings,
    chat: ChatTexts,
    click_policy: ClickPolicy,
}

impl SessionRunner {
    pub fn new(
        cdp: Arc<dyn Cdp>,
        bus: MessageBus,
        roles: Arc<RoleMap>,
        timings: FlowTimings,
        chat: ChatTexts,
        click_policy: ClickPolicy,
    ) -> Self {
        Self {
            cdp,
            bus,
            roles,
            timings,
            chat,
            click_policy,
        }
    }

    /// Opens a tab on the meeting and runs the session in it.
    pub async fn open(
        &self,
        meeting: MeetingRef,
        page_events: broadcast::Receiver<RawEvent>,
        stop: CancellationToken,
    ) -> Result<SessionSummary, FlowError> {
        let page = self
            .cdp
            .create_page(&meeting.url)
            .await
            .map_err(|err| FlowError::Host(err.into()))?;
        info!(%page, url = %meeting.url, "meeting tab opened");
        self.run_on_page(page, meeting, page_events, stop).await
    }

    /// Runs a session on an existing tab until it leaves, the tab closes or `stop`
    /// fires.
    #[instrument(skip_all, fields(page = %page, url = %meeting.url))]
    pub async fn run_on_page(
        &self,
        page: PageId,
        meeting: MeetingRef,
        page_events: broadcast::Receiver<RawEvent>,
        stop: CancellationToken,
    ) -> Result<SessionSummary, FlowError> {
        let dom: Arc<dyn DomPort> = Arc::new(CdpPage::new(self.cdp.clone(), page.clone()));
        let host = Arc::new(BusHost::new(self.bus.clone(), self.cdp.clone(), page.clone()));
        let native = Arc::new(BusNativeInput::new(self.bus.clone(), page.clone()));
        let flow = CallFlow::builder(dom, host, meeting)
            .native(native)
            .roles(self.roles.clone())
            .timings(self.timings.clone())
            .chat(self.chat.clone())
            .click_policy(self.click_policy.clone())
            .build();

        let session_stop = stop.child_token();
        let (updates_tx, updates) = mpsc::channel(CONFIG_UPDATES);
        let relay = tokio::spawn(relay_config_updates(
            self.bus.subscribe(),
            updates_tx,
            session_stop.clone(),
        ));
        let watcher = tokio::spawn(watch_page_close(
            page_events,
            page.clone(),
            session_stop.clone(),
        ));

        let result = flow.run(updates, session_stop.clone()).await;
        session_stop.cancel();
        relay.abort();
        watcher.abort();

        let adapter = cdp_adapter::metrics::snapshot();
        let clicks = flow.click_metrics();
        match &result {
            Ok(summary) => {
                info!(
                    end = end_label(&summary.end),
                    greeted = summary.greeted,
                    join_attempts = summary.join.attempts,
                    clicks_ok = clicks.ok,
                    clicks_ineffective = clicks.ineffective,
                    clicks_raised = clicks.raised,
                    cdp_commands = adapter.commands,
                    cdp_failures = adapter.command_failures,
                    "session ended"
                );
                if matches!(summary.end, SessionEnd::Exited(_)) {
                    // A tab that already went away reports PageNotFound; nothing to do.
                    if let Err(err) = self.cdp.close_page(&page).await {
                        debug!(%err, "tab already closed");
                    }
                }
            }
            Err(err) => warn!(
                %err,
                clicks_ok = clicks.ok,
                clicks_ineffective = clicks.ineffective,
                clicks_raised = clicks.raised,
                cdp_commands = adapter.commands,
                cdp_failures = adapter.command_failures,
                "session failed"
            ),
        }
        cdp_adapter::metrics::log_gathered();
        result
    }
}

fn end_label(end: &SessionEnd) -> &'static str {
    match end {
        SessionEnd::Exited(_) => "exited",
        SessionEnd::Stopped => "stopped",
        SessionEnd::PageGone => "page-gone",
    }
}

/// Forwards `CONFIG_UPDATED` broadcasts to the session as decoded configs.
async fn relay_config_updates(
    mut notifications: broadcast::Receiver<Envelope>,
    updates: mpsc::Sender<MeetingConfig>,
    stop: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = stop.cancelled() => return,
            next = notifications.recv() => match next {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "config notifications lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        };
        if envelope.message_type().ok() != Some(MessageType::ConfigUpdated) {
            continue;
        }
        match serde_json::from_value::<MeetingConfig>(envelope.data) {
            Ok(config) => {
                if updates.send(config).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(%err, "undecodable CONFIG_UPDATED payload"),
        }
    }
}

/// Stops the session when the adapter reports its tab closed.
async fn watch_page_close(
    mut events: broadcast::Receiver<RawEvent>,
    page: PageId,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            next = events.recv() => match next {
                Ok(RawEvent::PageClosed { page: closed, .. }) if closed == page => {
                    info!(%page, "tab closed");
                    stop.cancel();
                    return;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}
