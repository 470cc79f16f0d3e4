//! Pre-join device setup and join-control activation.

use std::fmt;
use std::sync::Arc;

use action_locator::LocatorRole;
use callwarden_core_types::now_ms;
use parking_lot::Mutex;
use tool_click::Verification;
use tracing::{debug, info, instrument, warn};

use crate::errors::FlowError;
use crate::page::{CallPage, SessionLog};
use crate::timings::FlowTimings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Idle,
    ConfiguringDevices,
    FindingJoinControl,
    Joining,
    Joined,
    Aborted,
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinState::Idle => "idle",
            JoinState::ConfiguringDevices => "configuring-devices",
            JoinState::FindingJoinControl => "finding-join-control",
            JoinState::Joining => "joining",
            JoinState::Joined => "joined",
            JoinState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReport {
    /// Epoch milliseconds of the successful join click.
    pub joined_at: i64,
    pub attempts: u32,
    /// Device toggles that had to be clicked.
    pub muted: Vec<LocatorRole>,
}

/// Drives one tab from the pre-join screen into the call. Runs once; every failure is
/// terminal.
pub struct JoinPipeline {
    page: Arc<CallPage>,
    log: Arc<SessionLog>,
    timings: FlowTimings,
    state: Mutex<JoinState>,
}

impl JoinPipeline {
    pub fn new(page: Arc<CallPage>, log: Arc<SessionLog>, timings: FlowTimings) -> Self {
        Self {
            page,
            log,
            timings,
            state: Mutex::new(JoinState::Idle),
        }
    }

    pub fn state(&self) -> JoinState {
        *self.state.lock()
    }

    fn transition(&self, next: JoinState) {
        let mut state = self.state.lock();
        debug!(from = %*state, to = %next, "join state");
        *state = next;
    }

    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<JoinReport, FlowError> {
        match self.drive().await {
            Ok(report) => {
                self.transition(JoinState::Joined);
                self.log
                    .line(format!("joined after {} attempt(s)", report.attempts))
                    .await;
                Ok(report)
            }
            Err(err) => {
                self.transition(JoinState::Aborted);
                warn!(%err, "join aborted");
                self.log.line(format!("join aborted: {err}")).await;
                Err(err)
            }
        }
    }

    async fn drive(&self) -> Result<JoinReport, FlowError> {
        self.transition(JoinState::ConfiguringDevices);
        let mut muted = Vec::new();
        for role in [LocatorRole::MicToggle, LocatorRole::CameraToggle] {
            if self.mute(role).await? {
                muted.push(role);
            }
        }

        let budget = self.timings.join_attempts.max(1);
        for attempt in 1..=budget {
            self.transition(JoinState::FindingJoinControl);
            self.log
                .line(format!("looking for the join control ({attempt}/{budget})"))
                .await;
            if self.try_join().await? {
                return Ok(JoinReport {
                    joined_at: now_ms(),
                    attempts: attempt,
                    muted,
                });
            }
            if attempt < budget {
                tokio::time::sleep(self.timings.retry_pause).await;
            }
        }
        Err(FlowError::JoinExhausted { attempts: budget })
    }

    /// Mutes the device if it is live; returns whether a click was needed.
    async fn mute(&self, role: LocatorRole) -> Result<bool, FlowError> {
        let Some(toggle) = self.page.locator.locate(role, None).await? else {
            return Err(FlowError::ControlMissing(role));
        };
        let device = &self.page.roles().device_state;
        let current = self.page.dom.attribute(&toggle, &device.attribute).await?;
        if current.as_deref() == Some(device.muted_value.as_str()) {
            debug!(%role, "already muted");
            return Ok(false);
        }
        self.log.line(format!("muting {role}")).await;
        let verification = Verification::attribute(&device.attribute, &device.muted_value);
        match self.page.executor.click(&toggle, &verification).await {
            Ok(report) => {
                info!(%role, strategy = report.strategy, "device muted");
                Ok(true)
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => Err(FlowError::MuteFailed {
                role,
                reason: err.to_string(),
            }),
        }
    }

    /// One attempt: find a join control carrying the expected label and click it until
    /// it leaves the page.
    async fn try_join(&self) -> Result<bool, FlowError> {
        let labels = &self.page.roles().join_labels;
        let found = self
            .page
            .locator
            .locate_labeled(
                LocatorRole::JoinButton,
                labels,
                Some(self.timings.join_attempt_timeout),
            )
            .await;
        let control = match found {
            Ok(Some(el)) => el,
            Ok(None) => {
                self.log.line("join control not found").await;
                return Ok(false);
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                self.log.line(format!("join lookup failed: {err}")).await;
                return Ok(false);
            }
        };

        self.transition(JoinState::Joining);
        match self.page.executor.click(&control, &Verification::Detached).await {
            Ok(report) => {
                info!(strategy = report.strategy, "join control activated");
                Ok(true)
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                self.log.line(format!("join click failed: {err}")).await;
                Ok(false)
            }
        }
    }
}
