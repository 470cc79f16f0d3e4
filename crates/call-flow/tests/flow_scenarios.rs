use std::sync::Arc;
use std::time::Duration;

use action_locator::{LocatorRole, RoleMap};
use action_primitives::{ClickChannel, ClickEffect, DomPort, FakeElement, InMemoryPage};
use async_trait::async_trait;
use callwarden_call_flow::{
    CallFlow, ExitReason, FlowError, LeaveOutcome, MeetingRef, SessionEnd, SessionHost,
    SessionSummary, EXIT_INFO_OVERLAY,
};
use callwarden_config_store::{ExitMode, MeetingConfig};
use callwarden_core_types::WardenError;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const URL: &str = "https://meet.google.com/abc-defg-hij";

#[derive(Default)]
struct FakeHost {
    config: Mutex<MeetingConfig>,
    completions: Mutex<Vec<(String, Option<i64>, String)>>,
    force_closes: Mutex<u32>,
    lines: Mutex<Vec<String>>,
    /// Cancelled by `force_close`, the way the runner sees the tab go away.
    tab_closed: Mutex<Option<CancellationToken>>,
}

impl FakeHost {
    fn with_config(config: MeetingConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            ..Self::default()
        })
    }

    fn completions(&self) -> Vec<(String, Option<i64>, String)> {
        self.completions.lock().clone()
    }
}

#[async_trait]
impl SessionHost for FakeHost {
    async fn load_config(&self) -> Result<MeetingConfig, WardenError> {
        Ok(self.config.lock().clone())
    }

    async fn complete_meeting(
        &self,
        url: &str,
        scheduled_time: Option<i64>,
        reason: &str,
    ) -> Result<(), WardenError> {
        self.completions
            .lock()
            .push((url.to_string(), scheduled_time, reason.to_string()));
        Ok(())
    }

    async fn force_close(&self) -> Result<(), WardenError> {
        *self.force_closes.lock() += 1;
        if let Some(closed) = self.tab_closed.lock().as_ref() {
            closed.cancel();
        }
        Ok(())
    }

    async fn debug_log(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

fn selector(role: LocatorRole, index: usize) -> String {
    RoleMap::builtin().candidates(role)[index].clone()
}

fn device(key: &str, role: LocatorRole, muted: &str) -> FakeElement {
    FakeElement::new(key)
        .selector(selector(role, 0))
        .attr("data-is-muted", muted)
        .on_click(ClickEffect::SetAttribute {
            name: "data-is-muted".into(),
            value: "true".into(),
        })
}

/// A pre-join screen with live devices, a labeled join control and an in-call toolbar.
fn meeting_page(initial_count: u32) -> InMemoryPage {
    let page = InMemoryPage::new();
    page.insert(device("mic", LocatorRole::MicToggle, "false"));
    page.insert(device("camera", LocatorRole::CameraToggle, "false"));
    page.insert(
        FakeElement::new("join")
            .selector(selector(LocatorRole::JoinButton, 0))
            .text("Join now")
            .on_click(ClickEffect::Detach),
    );
    page.insert(
        FakeElement::new("counter")
            .selector(selector(LocatorRole::ParticipantCount, 0))
            .text(initial_count.to_string()),
    );
    page.insert(FakeElement::new("chat-button").selector(selector(LocatorRole::ChatButton, 0)));
    page.insert(FakeElement::new("chat-input").selector(selector(LocatorRole::ChatInput, 0)));
    page.insert(
        FakeElement::new("leave")
            .selector(selector(LocatorRole::LeaveButton, 0))
            .on_click(ClickEffect::Detach),
    );
    page
}

fn participants(min: u32) -> MeetingConfig {
    MeetingConfig {
        exit_mode: ExitMode::Participants,
        min_participants: min,
        ..MeetingConfig::default()
    }
}

struct Running {
    flow: Arc<CallFlow>,
    updates: mpsc::Sender<MeetingConfig>,
    stop: CancellationToken,
    task: JoinHandle<Result<SessionSummary, FlowError>>,
}

fn start(page: &InMemoryPage, host: Arc<FakeHost>, scheduled_time: Option<i64>) -> Running {
    let dom: Arc<dyn DomPort> = Arc::new(page.clone());
    let flow = Arc::new(
        CallFlow::builder(
            dom,
            host,
            MeetingRef {
                url: URL.to_string(),
                scheduled_time,
            },
        )
        .build(),
    );
    let (updates, rx) = mpsc::channel(8);
    let stop = CancellationToken::new();
    let task = {
        let flow = flow.clone();
        let stop = stop.clone();
        tokio::spawn(async move { flow.run(rx, stop).await })
    };
    Running {
        flow,
        updates,
        stop,
        task,
    }
}

async fn until(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(600);
    while !check() {
        assert!(Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn walk_counts(page: &InMemoryPage, counts: &[u32]) {
    for count in counts {
        page.replace_text("counter", count.to_string());
        tokio::time::sleep(Duration::from_millis(1500)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn joins_muted_and_leaves_once_at_the_minimum() {
    let page = meeting_page(10);
    let host = FakeHost::with_config(participants(2));
    let running = start(&page, host.clone(), Some(1_700_000_000_000));

    until(|| running.flow.monitor().is_armed()).await;
    // Let the greeting go out first.
    tokio::time::sleep(Duration::from_secs(10)).await;
    walk_counts(&page, &[8, 5, 3, 2]).await;

    let summary = running.task.await.unwrap().unwrap();
    assert_eq!(page.attribute_of("mic", "data-is-muted").as_deref(), Some("true"));
    assert_eq!(page.attribute_of("camera", "data-is-muted").as_deref(), Some("true"));
    assert_eq!(
        summary.join.muted,
        vec![LocatorRole::MicToggle, LocatorRole::CameraToggle]
    );
    assert_eq!(summary.join.attempts, 1);
    assert!(summary.greeted);

    let SessionEnd::Exited(record) = summary.end else {
        panic!("expected an exit, got {:?}", summary.end);
    };
    assert_eq!(record.reason, ExitReason::MinimumParticipants);
    assert_eq!(record.leave, LeaveOutcome::Left);
    assert!(record.farewell_sent);
    assert!(record.completion_recorded);
    assert_eq!(
        host.completions(),
        vec![(
            URL.to_string(),
            Some(1_700_000_000_000),
            "Minimum participants reached".to_string()
        )]
    );
    assert!(!page.is_attached_key("leave"));
    assert_eq!(
        page.submitted_texts("chat-input"),
        vec!["Hello".to_string(), "Goodbye".to_string()]
    );
    let session = running.flow.monitor().session();
    assert_eq!(session.participant_count, 2);
    assert_eq!(session.peak_participants, 10);
    assert!(page.overlay(EXIT_INFO_OVERLAY).is_none());

    // Mic, camera, join and leave at least.
    let clicks = running.flow.click_metrics();
    assert!(clicks.ok >= 4, "{clicks:?}");
    assert_eq!(clicks.raised, 0);
}

#[tokio::test(start_paused = true)]
async fn peak_mode_leaves_at_the_percentage_of_the_running_max() {
    let page = meeting_page(4);
    let host = FakeHost::with_config(MeetingConfig {
        exit_mode: ExitMode::Peak,
        peak_percentage: 50,
        ..MeetingConfig::default()
    });
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    walk_counts(&page, &[10, 6]).await;
    assert!(running.flow.monitor().outcome().is_none());
    walk_counts(&page, &[5]).await;

    let summary = running.task.await.unwrap().unwrap();
    let SessionEnd::Exited(record) = summary.end else {
        panic!("expected an exit");
    };
    assert_eq!(record.reason, ExitReason::PeakPercentage);
    assert_eq!(host.completions()[0].2, "Peak percentage threshold reached");
}

#[tokio::test(start_paused = true)]
async fn timer_fires_after_the_configured_minutes() {
    let page = meeting_page(3);
    let host = FakeHost::with_config(MeetingConfig {
        exit_mode: ExitMode::Timer,
        timer_duration: 1,
        ..MeetingConfig::default()
    });
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    let armed_at = Instant::now();
    let record = running.flow.monitor().wait_for_exit().await.unwrap();
    assert_eq!(record.reason, ExitReason::TimerExpired);
    assert!(armed_at.elapsed() >= Duration::from_secs(59));
    assert!(armed_at.elapsed() < Duration::from_secs(90));
    assert_eq!(host.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn config_change_rearms_with_a_fresh_timer() {
    let page = meeting_page(3);
    let host = FakeHost::with_config(MeetingConfig {
        exit_mode: ExitMode::Timer,
        timer_duration: 1,
        ..MeetingConfig::default()
    });
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    let armed_at = Instant::now();
    tokio::time::sleep(Duration::from_secs(30)).await;
    running
        .updates
        .send(MeetingConfig {
            exit_mode: ExitMode::Timer,
            timer_duration: 2,
            ..MeetingConfig::default()
        })
        .await
        .unwrap();

    let record = running.flow.monitor().wait_for_exit().await.unwrap();
    assert_eq!(record.reason, ExitReason::TimerExpired);
    assert!(armed_at.elapsed() >= Duration::from_secs(149));
    assert_eq!(host.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_auto_exit_never_leaves() {
    let page = meeting_page(5);
    let host = FakeHost::with_config(MeetingConfig {
        auto_exit_enabled: false,
        ..participants(2)
    });
    let running = start(&page, host.clone(), None);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!running.flow.monitor().is_armed());
    walk_counts(&page, &[2, 1]).await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert!(running.flow.monitor().outcome().is_none());
    assert!(host.completions().is_empty());
    assert!(page.is_attached_key("leave"));

    running.stop.cancel();
    let summary = running.task.await.unwrap().unwrap();
    assert_eq!(summary.end, SessionEnd::Stopped);
}

#[tokio::test(start_paused = true)]
async fn disarming_before_the_threshold_wins() {
    let page = meeting_page(6);
    let host = FakeHost::with_config(participants(2));
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    running
        .updates
        .send(MeetingConfig {
            auto_exit_enabled: false,
            ..participants(2)
        })
        .await
        .unwrap();
    until(|| !running.flow.monitor().is_armed()).await;
    walk_counts(&page, &[2, 1]).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(running.flow.monitor().outcome().is_none());
    assert!(host.completions().is_empty());
    running.stop.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn auto_exit_disabled_during_the_greeting_wins() {
    let page = meeting_page(6);
    let host = FakeHost::with_config(participants(2));
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    running
        .updates
        .send(MeetingConfig {
            auto_exit_enabled: false,
            ..participants(2)
        })
        .await
        .unwrap();
    // Still inside the chat delay.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!running.flow.monitor().is_armed());
    assert!(page.submitted_texts("chat-input").is_empty());

    page.replace_text("counter", "2");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(running.flow.monitor().outcome().is_none());
    assert!(host.completions().is_empty());
    assert!(page.is_attached_key("leave"));

    running.stop.cancel();
    let summary = running.task.await.unwrap().unwrap();
    assert!(summary.greeted);
    assert_eq!(summary.end, SessionEnd::Stopped);
}

#[tokio::test(start_paused = true)]
async fn exit_during_the_chat_delay_sends_only_the_farewell() {
    let page = meeting_page(6);
    let host = FakeHost::with_config(participants(2));
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    page.replace_text("counter", "2");

    let summary = running.task.await.unwrap().unwrap();
    assert!(matches!(summary.end, SessionEnd::Exited(_)));
    assert!(!summary.greeted);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(page.submitted_texts("chat-input"), vec!["Goodbye".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn stop_during_the_greeting_disarms() {
    let page = meeting_page(6);
    let host = FakeHost::with_config(participants(2));
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    running.stop.cancel();
    let summary = running.task.await.unwrap().unwrap();
    assert_eq!(summary.end, SessionEnd::Stopped);
    assert!(!summary.greeted);
    assert!(!running.flow.monitor().is_armed());

    page.replace_text("counter", "2");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(running.flow.monitor().outcome().is_none());
    assert!(host.completions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn tab_closing_under_a_forced_exit_still_reports_the_exit() {
    let page = meeting_page(5);
    page.detach("leave");
    let host = FakeHost::with_config(participants(3));
    let running = start(&page, host.clone(), None);
    *host.tab_closed.lock() = Some(running.stop.clone());

    until(|| running.flow.monitor().is_armed()).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    walk_counts(&page, &[3]).await;

    let summary = running.task.await.unwrap().unwrap();
    assert!(running.stop.is_cancelled());
    let SessionEnd::Exited(record) = summary.end else {
        panic!("expected an exit, got {:?}", summary.end);
    };
    assert_eq!(record.reason, ExitReason::MinimumParticipants);
    assert_eq!(record.leave, LeaveOutcome::ForceClosed);
    assert_eq!(host.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_leave_control_falls_back_to_closing_the_tab() {
    let page = meeting_page(5);
    page.detach("leave");
    let host = FakeHost::with_config(participants(3));
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    walk_counts(&page, &[3]).await;

    let summary = running.task.await.unwrap().unwrap();
    let SessionEnd::Exited(record) = summary.end else {
        panic!("expected an exit");
    };
    assert_eq!(record.leave, LeaveOutcome::ForceClosed);
    assert_eq!(*host.force_closes.lock(), 1);
    assert_eq!(host.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn already_muted_devices_are_left_alone() {
    let page = InMemoryPage::new();
    page.insert(device("mic", LocatorRole::MicToggle, "true"));
    page.insert(device("camera", LocatorRole::CameraToggle, "true"));
    page.insert(
        FakeElement::new("join")
            .selector(selector(LocatorRole::JoinButton, 0))
            .text("Participar agora")
            .on_click(ClickEffect::Detach),
    );
    let host = FakeHost::with_config(MeetingConfig {
        auto_exit_enabled: false,
        ..MeetingConfig::default()
    });
    let running = start(&page, host, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    running.stop.cancel();
    let summary = running.task.await.unwrap().unwrap();
    assert!(summary.join.muted.is_empty());
    assert!(page.clicks_on("mic").is_empty());
    assert!(page.clicks_on("camera").is_empty());
    assert!(!page.is_attached_key("join"));
}

#[tokio::test(start_paused = true)]
async fn missing_device_toggle_aborts_the_join() {
    let page = InMemoryPage::new();
    page.insert(device("camera", LocatorRole::CameraToggle, "false"));
    let host = FakeHost::with_config(MeetingConfig::default());
    let running = start(&page, host, None);

    let err = running.task.await.unwrap().unwrap_err();
    assert!(matches!(err, FlowError::ControlMissing(LocatorRole::MicToggle)));
    assert!(page.clicks_on("camera").is_empty());
}

#[tokio::test(start_paused = true)]
async fn unresponsive_toggle_is_a_mute_failure() {
    let page = InMemoryPage::new();
    page.insert(device("mic", LocatorRole::MicToggle, "false").responds_to(&[]));
    page.insert(device("camera", LocatorRole::CameraToggle, "false"));
    let host = FakeHost::with_config(MeetingConfig::default());
    let running = start(&page, host, None);

    let err = running.task.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        FlowError::MuteFailed {
            role: LocatorRole::MicToggle,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn unlabeled_join_control_exhausts_the_attempts() {
    let page = InMemoryPage::new();
    page.insert(device("mic", LocatorRole::MicToggle, "true"));
    page.insert(device("camera", LocatorRole::CameraToggle, "true"));
    page.insert(
        FakeElement::new("other")
            .selector(selector(LocatorRole::JoinButton, 0))
            .text("Present now")
            .on_click(ClickEffect::Detach),
    );
    let host = FakeHost::with_config(MeetingConfig::default());
    let running = start(&page, host.clone(), None);

    let err = running.task.await.unwrap().unwrap_err();
    assert!(matches!(err, FlowError::JoinExhausted { attempts: 5 }));
    assert!(page.clicks_on("other").is_empty());
    assert!(host
        .lines
        .lock()
        .iter()
        .any(|line| line.contains("join control not found")));
}

#[tokio::test(start_paused = true)]
async fn join_click_escalates_past_an_ignored_strategy() {
    let page = meeting_page(4);
    page.update("join", |el| el.responds_to = vec![ClickChannel::Pointer]);
    let host = FakeHost::with_config(MeetingConfig {
        auto_exit_enabled: false,
        ..MeetingConfig::default()
    });
    let running = start(&page, host, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    running.stop.cancel();
    let summary = running.task.await.unwrap().unwrap();
    assert_eq!(summary.join.attempts, 1);
    assert_eq!(
        page.clicks_on("join"),
        vec![ClickChannel::Dom, ClickChannel::Pointer]
    );
    assert!(running.flow.click_metrics().ineffective >= 1);
}

#[tokio::test(start_paused = true)]
async fn closed_tab_ends_the_session() {
    let page = meeting_page(4);
    let host = FakeHost::with_config(participants(2));
    let running = start(&page, host.clone(), None);

    until(|| running.flow.monitor().is_armed()).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    page.close();

    let summary = running.task.await.unwrap().unwrap();
    assert_eq!(summary.end, SessionEnd::PageGone);
    assert!(host.completions().is_empty());
}
