use std::sync::Arc;

use callwarden_config_store::{ConfigStore, InMemoryKv, KvStore, ManualClock, MAX_MEETINGS};
use callwarden_scheduler::{
    AlarmAction, AlarmFacility, MeetingKey, SchedulerGateway, TokioAlarms, SWEEP_ALARM,
};

const NOW: i64 = 1_700_000_000_000;
const URL: &str = "https://meet.google.com/abc-defg-hij";

struct Fixture {
    gateway: SchedulerGateway,
    alarms: Arc<TokioAlarms>,
    store: Arc<ConfigStore>,
    _rx: tokio::sync::mpsc::UnboundedReceiver<callwarden_scheduler::FiredAlarm>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(NOW));
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::default());
    let store = Arc::new(ConfigStore::new(kv).with_clock(clock.clone()));
    let (alarms, rx) = TokioAlarms::new(clock);
    let alarms = Arc::new(alarms);
    let gateway = SchedulerGateway::new(alarms.clone(), store.clone());
    Fixture {
        gateway,
        alarms,
        store,
        _rx: rx,
    }
}

#[tokio::test(start_paused = true)]
async fn schedule_registers_one_alarm_per_slot() {
    let fx = fixture();
    fx.gateway.schedule(URL, NOW + 60_000).await.unwrap();
    let again = fx.gateway.schedule(URL, NOW + 60_000).await.unwrap();
    assert!(!again.added);

    let pending = fx.alarms.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, MeetingKey::new(URL, NOW + 60_000).alarm_name());
    assert_eq!(pending[0].fire_at_ms, NOW + 60_000);
}

#[tokio::test(start_paused = true)]
async fn evicted_meetings_lose_their_alarms() {
    let fx = fixture();
    for i in 0..=(MAX_MEETINGS as i64) {
        fx.gateway.schedule(URL, NOW + 1_000 + i).await.unwrap();
    }
    let pending = fx.alarms.pending();
    assert_eq!(pending.len(), MAX_MEETINGS);
    assert_eq!(pending[0].fire_at_ms, NOW + 1_001);
}

#[tokio::test(start_paused = true)]
async fn unschedule_cancels_and_removes() {
    let fx = fixture();
    fx.gateway.schedule(URL, NOW + 5_000).await.unwrap();
    assert!(fx.gateway.unschedule(URL, NOW + 5_000).await.unwrap());
    assert!(fx.alarms.pending().is_empty());
    assert!(fx.store.get_meetings(true).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn restore_skips_completed_and_adds_sweep() {
    let fx = fixture();
    fx.store.schedule_meeting(URL, NOW + 10).await.unwrap();
    fx.store.schedule_meeting(URL, NOW + 20).await.unwrap();
    fx.store
        .complete_meeting(URL, Some(NOW + 10), "Timer expired")
        .await
        .unwrap();
    fx.alarms.register("stale", NOW + 99);

    assert_eq!(fx.gateway.restore().await.unwrap(), 1);
    let names: Vec<String> = fx.alarms.pending().into_iter().map(|a| a.name).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&MeetingKey::new(URL, NOW + 20).alarm_name()));
    assert!(names.contains(&SWEEP_ALARM.to_string()));
}

#[tokio::test(start_paused = true)]
async fn fired_alarms_resolve_to_actions() {
    let fx = fixture();
    let open = fx
        .gateway
        .resolve(&callwarden_scheduler::FiredAlarm {
            name: MeetingKey::new(URL, NOW).alarm_name(),
            scheduled_for_ms: NOW,
            fired_at_ms: NOW,
        })
        .await
        .unwrap();
    assert_eq!(open, AlarmAction::OpenMeeting(MeetingKey::new(URL, NOW)));

    let swept = fx
        .gateway
        .resolve(&callwarden_scheduler::FiredAlarm {
            name: SWEEP_ALARM.into(),
            scheduled_for_ms: NOW,
            fired_at_ms: NOW,
        })
        .await
        .unwrap();
    assert_eq!(swept, AlarmAction::Swept(0));

    assert!(fx
        .gateway
        .resolve(&callwarden_scheduler::FiredAlarm {
            name: "garbage".into(),
            scheduled_for_ms: NOW,
            fired_at_ms: NOW,
        })
        .await
        .is_err());
}
