//! One tab's life: wait for the page, join, arm the monitor, greet, follow config
//! changes until the monitor leaves or the host stops the session.

use std::sync::Arc;

use action_locator::RoleMap;
use action_primitives::{DomPort, NativeInput};
use callwarden_config_store::MeetingConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tool_click::{ClickMetricsSnapshot, ClickPolicy};
use tracing::{info, instrument, warn};

use crate::errors::FlowError;
use crate::host::SessionHost;
use crate::join::{JoinPipeline, JoinReport};
use crate::monitor::{ExitMonitor, ExitRecord, MeetingRef};
use crate::page::{CallPage, SessionLog};
use crate::timings::{ChatTexts, FlowTimings};

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The monitor ran the leave sequence.
    Exited(ExitRecord),
    /// Stopped from outside (tab closed, host shutting down).
    Stopped,
    /// The page disappeared under the monitor.
    PageGone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub join: JoinReport,
    pub greeted: bool,
    pub end: SessionEnd,
}

pub struct CallFlowBuilder {
    dom: Arc<dyn DomPort>,
    host: Arc<dyn SessionHost>,
    meeting: MeetingRef,
    native: Option<Arc<dyn NativeInput>>,
    roles: Arc<RoleMap>,
    timings: FlowTimings,
    chat: ChatTexts,
    click_policy: ClickPolicy,
}

impl CallFlowBuilder {
    pub fn native(mut self, native: Arc<dyn NativeInput>) -> Self {
        self.native = Some(native);
        self
    }

    pub fn roles(mut self, roles: Arc<RoleMap>) -> Self {
        self.roles = roles;
        self
    }

    pub fn timings(mut self, timings: FlowTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn chat(mut self, chat: ChatTexts) -> Self {
        self.chat = chat;
        self
    }

    pub fn click_policy(mut self, policy: ClickPolicy) -> Self {
        self.click_policy = policy;
        self
    }

    pub fn build(self) -> CallFlow {
        let page = Arc::new(CallPage::new(
            self.dom.clone(),
            self.native,
            self.roles,
            &self.timings,
            self.click_policy,
        ));
        let log = Arc::new(SessionLog::new(self.dom, self.host.clone(), false));
        let monitor = ExitMonitor::new(
            page.clone(),
            log.clone(),
            self.host.clone(),
            self.meeting.clone(),
            self.timings.clone(),
            self.chat.clone(),
        );
        CallFlow {
            page,
            log,
            host: self.host,
            meeting: self.meeting,
            timings: self.timings,
            chat: self.chat,
            monitor,
        }
    }
}

pub struct CallFlow {
    page: Arc<CallPage>,
    log: Arc<SessionLog>,
    host: Arc<dyn SessionHost>,
    meeting: MeetingRef,
    timings: FlowTimings,
    chat: ChatTexts,
    monitor: ExitMonitor,
}

impl CallFlow {
    pub fn builder(
        dom: Arc<dyn DomPort>,
        host: Arc<dyn SessionHost>,
        meeting: MeetingRef,
    ) -> CallFlowBuilder {
        CallFlowBuilder {
            dom,
            host,
            meeting,
            native: None,
            roles: Arc::new(RoleMap::builtin()),
            timings: FlowTimings::default(),
            chat: ChatTexts::default(),
            click_policy: ClickPolicy::default(),
        }
    }

    pub fn monitor(&self) -> &ExitMonitor {
        &self.monitor
    }

    pub fn meeting(&self) -> &MeetingRef {
        &self.meeting
    }

    /// Click outcomes of this session so far.
    pub fn click_metrics(&self) -> ClickMetricsSnapshot {
        self.page.executor.metrics()
    }

    /// Runs the session. `updates` carries sanitized config changes; `stop` ends the
    /// session without leaving (the tab is already gone or the host is shutting down).
    #[instrument(skip_all, fields(url = %self.meeting.url))]
    pub async fn run(
        &self,
        mut updates: mpsc::Receiver<MeetingConfig>,
        stop: CancellationToken,
    ) -> Result<SessionSummary, FlowError> {
        tokio::select! {
            _ = stop.cancelled() => return Err(FlowError::PageGone("stopped before joining".into())),
            _ = tokio::time::sleep(self.timings.page_load_delay) => {}
        }

        let mut config = self.host.load_config().await?;
        self.log.set_enabled(config.show_debug).await;
        self.log
            .line(format!("session starting, exit mode {}", config.exit_mode))
            .await;

        let pipeline = JoinPipeline::new(self.page.clone(), self.log.clone(), self.timings.clone());
        let join = tokio::select! {
            _ = stop.cancelled() => return Err(FlowError::PageGone("stopped while joining".into())),
            joined = pipeline.run() => joined?,
        };
        self.monitor.mark_joined(join.joined_at);

        tokio::select! {
            _ = stop.cancelled() => return Ok(self.summary(join, false, SessionEnd::Stopped)),
            _ = tokio::time::sleep(self.timings.settle_delay) => {}
        }

        // Changes that arrived while joining apply before arming.
        while let Ok(next) = updates.try_recv() {
            config = next;
        }
        self.log.set_enabled(config.show_debug).await;
        if self.monitor.arm(&config) {
            self.log.line("exit monitor armed").await;
        } else {
            self.log.line("automatic exit is off").await;
        }

        let greeting = self.greet();
        tokio::pin!(greeting);
        let mut greeting_done = false;
        let mut greeted = false;
        let mut updates_open = true;
        loop {
            tokio::select! {
                biased;
                record = self.monitor.wait_for_exit() => {
                    return Ok(self.finish(join, greeted, record));
                }
                _ = stop.cancelled() => {
                    self.monitor.disarm();
                    let end = self.settle_exit(SessionEnd::Stopped).await;
                    return Ok(self.summary(join, greeted, end));
                }
                _ = self.monitor.page_gone() => {
                    let end = self.settle_exit(SessionEnd::PageGone).await;
                    return Ok(self.summary(join, greeted, end));
                }
                // The farewell owns the chat box once the leave sequence starts.
                _ = self.monitor.exit_started(), if !greeting_done => {
                    greeting_done = true;
                }
                sent = &mut greeting, if !greeting_done => {
                    greeted = sent;
                    greeting_done = true;
                }
                next = updates.recv(), if updates_open => match next {
                    Some(next) => self.apply(&next).await,
                    None => updates_open = false,
                },
            }
        }
    }

    /// A stop that lands mid-exit still reports the exit once it is published.
    async fn settle_exit(&self, otherwise: SessionEnd) -> SessionEnd {
        if !self.monitor.is_exiting() {
            return otherwise;
        }
        match tokio::time::timeout(self.timings.exit_budget(), self.monitor.wait_for_exit()).await {
            Ok(Some(record)) => SessionEnd::Exited(record),
            _ => otherwise,
        }
    }

    async fn apply(&self, config: &MeetingConfig) {
        self.log.set_enabled(config.show_debug).await;
        if self.monitor.is_exiting() {
            return;
        }
        let armed = self.monitor.reconfigure(config);
        self.log
            .line(format!(
                "config updated: mode {}, monitor {}",
                config.exit_mode,
                if armed { "armed" } else { "off" }
            ))
            .await;
    }

    /// Best-effort greeting. Skipped when the monitor is already leaving.
    async fn greet(&self) -> bool {
        tokio::time::sleep(self.timings.chat_delay).await;
        if self.monitor.is_exiting() {
            return false;
        }
        match self
            .page
            .send_chat(
                &self.chat.greeting,
                self.timings.chat_attempts,
                self.timings.chat_locate_timeout,
                &self.log,
            )
            .await
        {
            Ok(sent) => sent,
            Err(err) => {
                warn!(%err, "greeting failed");
                false
            }
        }
    }

    fn finish(&self, join: JoinReport, greeted: bool, record: Option<ExitRecord>) -> SessionSummary {
        let end = match record {
            Some(record) => SessionEnd::Exited(record),
            None => SessionEnd::Stopped,
        };
        self.summary(join, greeted, end)
    }

    fn summary(&self, join: JoinReport, greeted: bool, end: SessionEnd) -> SessionSummary {
        info!(?end, greeted, "session finished");
        SessionSummary { join, greeted, end }
    }
}
