//! The per-tab toolkit shared by the join pipeline and the exit monitor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_locator::{ElementLocator, LocatorRole, RoleMap};
use action_primitives::{DomPort, NativeInput};
use parking_lot::Mutex;
use tool_click::{ActionExecutor, ClickPolicy, Verification};
use tool_type_text::{TextSubmitter, TypeTextError};
use tracing::{debug, info};

use crate::errors::FlowError;
use crate::host::SessionHost;
use crate::timings::FlowTimings;

pub const DEBUG_OVERLAY: &str = "debug";
pub const EXIT_INFO_OVERLAY: &str = "exit-info";
const DEBUG_LINES: usize = 20;

/// Locator, click executor and text submitter bound to one page.
pub struct CallPage {
    pub dom: Arc<dyn DomPort>,
    pub locator: ElementLocator,
    pub executor: ActionExecutor,
    pub text: TextSubmitter,
}

impl CallPage {
    pub fn new(
        dom: Arc<dyn DomPort>,
        native: Option<Arc<dyn NativeInput>>,
        roles: Arc<RoleMap>,
        timings: &FlowTimings,
        click_policy: ClickPolicy,
    ) -> Self {
        let locator =
            ElementLocator::new(dom.clone(), roles).with_default_timeout(timings.locate_timeout);
        let mut executor = ActionExecutor::builder(dom.clone()).policy(click_policy);
        if let Some(native) = native {
            executor = executor.native(native);
        }
        Self {
            dom,
            locator,
            executor: executor.build(),
            text: TextSubmitter::default(),
        }
    }

    pub fn roles(&self) -> &RoleMap {
        self.locator.roles()
    }

    /// One chat send: open the chat, find the input, submit. `Ok(false)` when a step
    /// came up empty; `Err` only when the page is gone.
    async fn chat_once(
        &self,
        text: &str,
        locate_timeout: Duration,
        log: &SessionLog,
    ) -> Result<bool, FlowError> {
        let button = match self
            .locator
            .locate(LocatorRole::ChatButton, Some(locate_timeout))
            .await
        {
            Ok(Some(el)) => el,
            Ok(None) => {
                log.line("chat button not found").await;
                return Ok(false);
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                log.line(format!("chat button lookup failed: {err}")).await;
                return Ok(false);
            }
        };
        match self.executor.click(&button, &Verification::None).await {
            Ok(_) => {}
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                log.line(format!("chat button click failed: {err}")).await;
                return Ok(false);
            }
        }
        let input = match self
            .locator
            .locate(LocatorRole::ChatInput, Some(locate_timeout))
            .await
        {
            Ok(Some(el)) => el,
            Ok(None) => {
                log.line("chat input not found").await;
                return Ok(false);
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                log.line(format!("chat input lookup failed: {err}")).await;
                return Ok(false);
            }
        };
        match self.text.submit(self.dom.as_ref(), &input, text).await {
            Ok(()) => Ok(true),
            Err(TypeTextError::Dom(err)) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                log.line(format!("chat submit failed: {err}")).await;
                Ok(false)
            }
        }
    }

    /// Up to `attempts` chat sends; reports whether one went through.
    pub async fn send_chat(
        &self,
        text: &str,
        attempts: u32,
        locate_timeout: Duration,
        log: &SessionLog,
    ) -> Result<bool, FlowError> {
        for attempt in 1..=attempts {
            log.line(format!("chat attempt {attempt}/{attempts}")).await;
            if self.chat_once(text, locate_timeout, log).await? {
                log.line(format!("chat message sent: {text}")).await;
                return Ok(true);
            }
        }
        log.line("every chat attempt failed").await;
        Ok(false)
    }
}

/// Session log: every line goes to tracing and the host; with debug display on, the
/// most recent lines are also mirrored into an on-page overlay.
pub struct SessionLog {
    dom: Arc<dyn DomPort>,
    host: Arc<dyn SessionHost>,
    enabled: AtomicBool,
    lines: Mutex<VecDeque<String>>,
}

impl SessionLog {
    pub fn new(dom: Arc<dyn DomPort>, host: Arc<dyn SessionHost>, show_debug: bool) -> Self {
        Self {
            dom,
            host,
            enabled: AtomicBool::new(show_debug),
            lines: Mutex::new(VecDeque::with_capacity(DEBUG_LINES)),
        }
    }

    pub async fn set_enabled(&self, on: bool) {
        let was = self.enabled.swap(on, Ordering::SeqCst);
        if was && !on {
            if let Err(err) = self.dom.remove_overlay(DEBUG_OVERLAY).await {
                debug!(%err, "debug overlay removal failed");
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn line(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "callwarden::session", "{message}");
        self.host.debug_log(&message).await;
        if !self.is_enabled() {
            return;
        }
        let snapshot: Vec<String> = {
            let mut lines = self.lines.lock();
            lines.push_front(message);
            lines.truncate(DEBUG_LINES);
            lines.iter().cloned().collect()
        };
        if let Err(err) = self.dom.render_overlay(DEBUG_OVERLAY, &snapshot).await {
            debug!(%err, "debug overlay render failed");
        }
    }
}
