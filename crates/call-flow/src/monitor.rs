//! Exit monitoring: one armed predicate, one leave sequence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_locator::LocatorRole;
use action_primitives::ActionError;
use callwarden_config_store::MeetingConfig;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tool_click::Verification;
use tracing::{debug, error, info, instrument, warn};

use crate::host::SessionHost;
use crate::page::{CallPage, SessionLog, EXIT_INFO_OVERLAY};
use crate::predicate::{ExitPredicate, ExitReason};
use crate::session::{parse_count, CallSession};
use crate::timings::{ChatTexts, FlowTimings};

/// The meeting a tab belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRef {
    pub url: String,
    /// Set when the tab was opened for a scheduled entry.
    pub scheduled_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The leave control was clicked and went away.
    Left,
    /// The leave control was unusable and the tab was terminated instead.
    ForceClosed,
    /// Neither worked; the tab may still be in the call.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    pub reason: ExitReason,
    pub leave: LeaveOutcome,
    pub farewell_sent: bool,
    pub completion_recorded: bool,
}

struct ArmedHandle {
    predicate: ExitPredicate,
    generation: u64,
    cancel: CancellationToken,
}

struct Shared {
    page: Arc<CallPage>,
    log: Arc<SessionLog>,
    host: Arc<dyn SessionHost>,
    meeting: MeetingRef,
    timings: FlowTimings,
    chat: ChatTexts,
    session: Mutex<CallSession>,
    armed: Mutex<Option<ArmedHandle>>,
    generation: AtomicU64,
    exiting: AtomicBool,
    show_exit_info: AtomicBool,
    overlay_shown: AtomicBool,
    outcome: watch::Sender<Option<ExitRecord>>,
    leaving: CancellationToken,
    gone: CancellationToken,
}

/// Watches a joined call and leaves it once the armed predicate holds.
///
/// At most one predicate is armed at a time. [`ExitMonitor::arm`] replaces whatever was
/// armed; [`ExitMonitor::disarm`] cancels it, and a trigger racing with a disarm loses.
/// The leave sequence runs at most once per monitor.
pub struct ExitMonitor {
    shared: Arc<Shared>,
}

impl ExitMonitor {
    pub fn new(
        page: Arc<CallPage>,
        log: Arc<SessionLog>,
        host: Arc<dyn SessionHost>,
        meeting: MeetingRef,
        timings: FlowTimings,
        chat: ChatTexts,
    ) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                page,
                log,
                host,
                meeting,
                timings,
                chat,
                session: Mutex::new(CallSession::new()),
                armed: Mutex::new(None),
                generation: AtomicU64::new(0),
                exiting: AtomicBool::new(false),
                show_exit_info: AtomicBool::new(true),
                overlay_shown: AtomicBool::new(false),
                outcome,
                leaving: CancellationToken::new(),
                gone: CancellationToken::new(),
            }),
        }
    }

    pub fn mark_joined(&self, at_ms: i64) {
        self.shared.session.lock().joined_at = Some(at_ms);
    }

    pub fn session(&self) -> CallSession {
        self.shared.session.lock().clone()
    }

    pub fn predicate(&self) -> Option<ExitPredicate> {
        self.shared.armed.lock().as_ref().map(|h| h.predicate)
    }

    pub fn is_armed(&self) -> bool {
        self.shared.armed.lock().is_some()
    }

    pub fn is_exiting(&self) -> bool {
        self.shared.exiting.load(Ordering::SeqCst)
    }

    /// Arms the predicate `cfg` selects, replacing any armed one. Returns `false` when
    /// nothing was armed: automatic exit is off, the timer is zero, or the leave
    /// sequence already started.
    pub fn arm(&self, cfg: &MeetingConfig) -> bool {
        let shared = &self.shared;
        shared
            .show_exit_info
            .store(cfg.show_exit_info, Ordering::SeqCst);
        let Some(predicate) = ExitPredicate::from_config(cfg) else {
            self.disarm();
            return false;
        };
        if shared.exiting.load(Ordering::SeqCst) {
            return false;
        }

        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let deadline = match predicate {
            ExitPredicate::Timer { after } => Some(Instant::now() + after),
            _ => None,
        };
        let previous = {
            let mut armed = shared.armed.lock();
            shared.session.lock().exit_armed = true;
            armed.replace(ArmedHandle {
                predicate,
                generation,
                cancel: cancel.clone(),
            })
        };
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        info!(mode = %predicate.mode(), generation, "exit monitor armed");

        tokio::spawn(run_armed(
            shared.clone(),
            generation,
            predicate,
            deadline,
            cancel,
        ));
        true
    }

    /// Cancels the armed predicate and its timers. Returns whether anything was armed.
    pub fn disarm(&self) -> bool {
        let handle = {
            let mut armed = self.shared.armed.lock();
            let handle = armed.take();
            if handle.is_some() {
                self.shared.session.lock().exit_armed = false;
            }
            handle
        };
        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                info!(generation = handle.generation, "exit monitor disarmed");
                true
            }
            None => false,
        }
    }

    /// Applies a config change: disarms when automatic exit went off, re-arms when the
    /// effective predicate changed, and leaves a matching armed predicate (and its
    /// running timer) alone. Returns whether a predicate is armed afterwards.
    pub fn reconfigure(&self, cfg: &MeetingConfig) -> bool {
        self.shared
            .show_exit_info
            .store(cfg.show_exit_info, Ordering::SeqCst);
        match (self.predicate(), ExitPredicate::from_config(cfg)) {
            (_, None) => {
                self.disarm();
                false
            }
            (Some(current), Some(next)) if current == next => true,
            _ => self.arm(cfg),
        }
    }

    pub fn outcome(&self) -> Option<ExitRecord> {
        self.shared.outcome.borrow().clone()
    }

    /// Resolves once the leave sequence has finished.
    pub async fn wait_for_exit(&self) -> Option<ExitRecord> {
        let mut rx = self.shared.outcome.subscribe();
        let record = rx.wait_for(Option::is_some).await.ok()?;
        record.clone()
    }

    /// Resolves as soon as the leave sequence is claimed, before it runs.
    pub async fn exit_started(&self) {
        self.shared.leaving.cancelled().await
    }

    /// Resolves when the monitor found the page gone.
    pub async fn page_gone(&self) {
        self.shared.gone.cancelled().await
    }
}

impl Drop for ExitMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.armed.lock().take() {
            handle.cancel.cancel();
        }
    }
}

async fn run_armed(
    shared: Arc<Shared>,
    generation: u64,
    predicate: ExitPredicate,
    deadline: Option<Instant>,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(shared.timings.tick);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let timer = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timer);

    loop {
        let seq = match shared.page.dom.mutation_seq().await {
            Ok(seq) => seq,
            Err(err) => {
                if shared.page_failed(&err) {
                    return;
                }
                0
            }
        };
        match shared.sample().await {
            Ok(Some(snapshot)) => {
                if let Some(reason) = predicate.evaluate(&snapshot) {
                    if shared.trigger(generation) {
                        shared.exit_sequence(reason).await;
                    }
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => {
                if shared.page_failed(&err) {
                    return;
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                shared.clear_exit_info().await;
                return;
            }
            _ = &mut timer => {
                if shared.trigger(generation) {
                    shared.exit_sequence(ExitReason::TimerExpired).await;
                }
                return;
            }
            _ = tick.tick() => {
                shared.render_exit_info(predicate, deadline).await;
            }
            _ = shared.page.dom.wait_for_mutation(seq, shared.timings.tick) => {}
        }
    }
}

impl Shared {
    /// Logs a failed page call; returns `true` when the page is gone for good.
    fn page_failed(&self, err: &ActionError) -> bool {
        if err.is_fatal() {
            warn!(%err, "page gone; exit monitor stopping");
            self.gone.cancel();
            true
        } else {
            debug!(%err, "participant sample failed");
            false
        }
    }

    /// Reads the participant counter, if present, into the session.
    async fn sample(&self) -> Result<Option<CallSession>, ActionError> {
        let candidates = self.page.roles().candidates(LocatorRole::ParticipantCount);
        let Some(counter) = self.page.dom.query_first(candidates).await? else {
            return Ok(None);
        };
        let mut count = self
            .page
            .dom
            .text_content(&counter)
            .await?
            .as_deref()
            .and_then(parse_count);
        for attr in ["data-participant-count", "aria-label"] {
            if count.is_some() {
                break;
            }
            count = self
                .page
                .dom
                .attribute(&counter, attr)
                .await?
                .as_deref()
                .and_then(parse_count);
        }
        let Some(count) = count else {
            return Ok(None);
        };

        let (changed, snapshot) = {
            let mut session = self.session.lock();
            let changed = session.observe(count);
            (changed, session.clone())
        };
        if changed {
            self.log
                .line(format!(
                    "participants: {} (peak {})",
                    snapshot.participant_count, snapshot.peak_participants
                ))
                .await;
        }
        Ok(Some(snapshot))
    }

    /// Claims the leave sequence for `generation`. Fails when that arming was replaced
    /// or disarmed, or when an exit already started.
    fn trigger(&self, generation: u64) -> bool {
        let handle = {
            let mut armed = self.armed.lock();
            match armed.as_ref() {
                Some(handle) if handle.generation == generation => {}
                _ => return false,
            }
            if self.exiting.swap(true, Ordering::SeqCst) {
                return false;
            }
            self.leaving.cancel();
            self.session.lock().exit_armed = false;
            armed.take()
        };
        if let Some(handle) = handle {
            handle.cancel.cancel();
        }
        true
    }

    #[instrument(skip(self), fields(url = %self.meeting.url))]
    async fn exit_sequence(&self, reason: ExitReason) {
        self.log.line(format!("leaving: {reason}")).await;
        self.clear_exit_info().await;

        let farewell_sent = match self
            .page
            .send_chat(
                &self.chat.farewell,
                self.timings.chat_attempts,
                self.timings.chat_locate_timeout,
                &self.log,
            )
            .await
        {
            Ok(sent) => sent,
            Err(err) => {
                warn!(%err, "farewell failed");
                false
            }
        };

        let completion_recorded = match self
            .host
            .complete_meeting(
                &self.meeting.url,
                self.meeting.scheduled_time,
                reason.as_str(),
            )
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "could not record meeting completion");
                false
            }
        };

        let leave = self.leave().await;
        let line = match &leave {
            LeaveOutcome::Left => Some("left the call"),
            LeaveOutcome::ForceClosed => Some("tab force-closed"),
            LeaveOutcome::Failed(why) => {
                error!(reason = %why, "could not leave the call");
                None
            }
        };

        // The page may already be gone; publish before touching it again.
        self.outcome.send_replace(Some(ExitRecord {
            reason,
            leave,
            farewell_sent,
            completion_recorded,
        }));
        if let Some(line) = line {
            self.log.line(line).await;
        }
    }

    async fn leave(&self) -> LeaveOutcome {
        let located = self
            .page
            .locator
            .locate(LocatorRole::LeaveButton, None)
            .await;
        let failure = match located {
            Ok(Some(control)) => {
                match self
                    .page
                    .executor
                    .click(&control, &Verification::Detached)
                    .await
                {
                    Ok(_) => return LeaveOutcome::Left,
                    Err(err) => err.to_string(),
                }
            }
            Ok(None) => "leave control not found".to_string(),
            Err(err) => err.to_string(),
        };
        warn!(%failure, "leave control unusable; closing the tab");
        match self.host.force_close().await {
            Ok(()) => LeaveOutcome::ForceClosed,
            Err(err) => LeaveOutcome::Failed(format!("{failure}; force close: {err}")),
        }
    }

    async fn render_exit_info(&self, predicate: ExitPredicate, deadline: Option<Instant>) {
        if !self.show_exit_info.load(Ordering::SeqCst) {
            self.clear_exit_info().await;
            return;
        }
        let session = self.session.lock().clone();
        let lines = exit_info_lines(predicate, &session, deadline.map(|at| {
            at.saturating_duration_since(Instant::now())
        }));
        match self.page.dom.render_overlay(EXIT_INFO_OVERLAY, &lines).await {
            Ok(()) => self.overlay_shown.store(true, Ordering::SeqCst),
            Err(err) => debug!(%err, "exit info render failed"),
        }
    }

    async fn clear_exit_info(&self) {
        if self.overlay_shown.swap(false, Ordering::SeqCst) {
            if let Err(err) = self.page.dom.remove_overlay(EXIT_INFO_OVERLAY).await {
                debug!(%err, "exit info removal failed");
            }
        }
    }
}

fn exit_info_lines(
    predicate: ExitPredicate,
    session: &CallSession,
    remaining: Option<Duration>,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(2);
    match predicate {
        ExitPredicate::Timer { .. } => {
            let secs = remaining.unwrap_or_default().as_secs();
            lines.push(format!("Leaving in {:02}:{:02}", secs / 60, secs % 60));
        }
        ExitPredicate::Participants { min } => {
            lines.push(format!("Leaving at <= {min} participants"));
        }
        ExitPredicate::Peak { percentage } => {
            lines.push(format!("Leaving at <= {percentage}% of peak"));
        }
    }
    if session.has_observation() {
        lines.push(format!(
            "Participants: {} (peak {})",
            session.participant_count, session.peak_participants
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_overlay_shows_minutes_and_seconds() {
        let lines = exit_info_lines(
            ExitPredicate::Timer {
                after: Duration::from_secs(600),
            },
            &CallSession::new(),
            Some(Duration::from_secs(125)),
        );
        assert_eq!(lines, vec!["Leaving in 02:05".to_string()]);
    }

    #[test]
    fn count_overlay_includes_peak() {
        let mut session = CallSession::new();
        session.observe(8);
        session.observe(5);
        let lines = exit_info_lines(ExitPredicate::Peak { percentage: 10 }, &session, None);
        assert_eq!(lines[1], "Participants: 5 (peak 8)");
    }
}
