use std::sync::Arc;

use callwarden_config_store::{
    ConfigStore, ExitMode, InMemoryKv, JsonFileKv, KvStore, ManualClock, Quota, StoreError,
    MAX_MEETINGS, RETENTION_MS,
};
use serde_json::json;

const NOW: i64 = 1_700_000_000_000;
const URL: &str = "https://meet.google.com/abc-defg-hij";

fn store() -> (ConfigStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(NOW));
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::default());
    (ConfigStore::new(kv).with_clock(clock.clone()), clock)
}

#[tokio::test]
async fn initialize_seeds_defaults_once() {
    let (store, _) = store();
    store.initialize().await.unwrap();
    store
        .update_config(&json!({ "exitMode": "peak" }))
        .await
        .unwrap();
    store.initialize().await.unwrap();
    assert_eq!(store.get_config().await.unwrap().exit_mode, ExitMode::Peak);
    assert!(store.get_meetings(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_then_get_returns_clamped_values() {
    let (store, _) = store();
    store.initialize().await.unwrap();
    let written = store
        .update_config(&json!({
            "exitMode": "participants",
            "peakPercentage": 150,
            "minParticipants": 0,
            "timerDuration": "abc",
        }))
        .await
        .unwrap();
    let read = store.get_config().await.unwrap();
    assert_eq!(written, read);
    assert_eq!(read.peak_percentage, 100);
    assert_eq!(read.min_participants, 1);
    assert_eq!(read.timer_duration, 30);
    assert_eq!(read.exit_mode, ExitMode::Participants);
}

#[tokio::test]
async fn update_rejects_non_objects() {
    let (store, _) = store();
    assert_eq!(
        store.update_config(&json!([1, 2])).await.unwrap_err(),
        StoreError::InvalidUpdate
    );
}

#[tokio::test]
async fn scheduling_validates_host_and_time() {
    let (store, _) = store();
    assert!(matches!(
        store.schedule_meeting("https://example.com/x", NOW + 1).await,
        Err(StoreError::InvalidUrl(_))
    ));
    assert!(matches!(
        store.schedule_meeting("not a url", NOW + 1).await,
        Err(StoreError::InvalidUrl(_))
    ));
    assert_eq!(
        store.schedule_meeting(URL, NOW).await.unwrap_err(),
        StoreError::NotInFuture(NOW)
    );
}

#[tokio::test]
async fn repeated_scheduling_never_duplicates_or_overflows() {
    let (store, _) = store();
    for round in 0..2 {
        for i in 0..(MAX_MEETINGS as i64 + 10) {
            let outcome = store.schedule_meeting(URL, NOW + 1_000 + i).await.unwrap();
            // the ten oldest were evicted in the first round and are re-added then dropped
            assert_eq!(outcome.added, round == 0 || i < 10);
            assert!(store.get_meetings(true).await.unwrap().len() <= MAX_MEETINGS);
        }
    }
    let list = store.get_meetings(true).await.unwrap();
    assert_eq!(list.len(), MAX_MEETINGS);
    assert!(list.windows(2).all(|w| w[0].time < w[1].time));
}

#[tokio::test]
async fn complete_meeting_marks_reason_and_hides_from_default_listing() {
    let (store, clock) = store();
    store.schedule_meeting(URL, NOW + 60_000).await.unwrap();
    store.schedule_meeting(URL, NOW + 120_000).await.unwrap();
    clock.advance_ms(90_000);

    let done = store
        .complete_meeting(URL, None, "Minimum participants reached")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.time, NOW + 60_000);
    assert_eq!(done.exit_reason.as_deref(), Some("Minimum participants reached"));

    let open = store.get_meetings(false).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].time, NOW + 120_000);

    assert!(store
        .complete_meeting("https://meet.google.com/zzz", None, "Timer expired")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn remove_meeting_reports_whether_it_existed() {
    let (store, _) = store();
    store.schedule_meeting(URL, NOW + 5).await.unwrap();
    assert!(store.remove_meeting(URL, NOW + 5).await.unwrap());
    assert!(!store.remove_meeting(URL, NOW + 5).await.unwrap());
}

#[tokio::test]
async fn cleanup_purges_only_old_completed() {
    let (store, clock) = store();
    store.schedule_meeting(URL, NOW + 10).await.unwrap();
    store.schedule_meeting(URL, NOW + 20).await.unwrap();
    clock.advance_ms(15);
    store
        .complete_meeting(URL, Some(NOW + 10), "Timer expired")
        .await
        .unwrap();
    clock.advance_ms(RETENTION_MS);
    assert_eq!(store.cleanup_old_meetings().await.unwrap(), 1);
    let left = store.get_meetings(true).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].time, NOW + 20);
}

#[tokio::test]
async fn file_backed_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("callwarden.json");
    {
        let kv: Arc<dyn KvStore> = Arc::new(JsonFileKv::open(&path, Quota::default()).unwrap());
        let store = ConfigStore::new(kv).with_clock(Arc::new(ManualClock::new(NOW)));
        store.initialize().await.unwrap();
        store
            .update_config(&json!({ "showDebug": true }))
            .await
            .unwrap();
        store.schedule_meeting(URL, NOW + 1).await.unwrap();
    }
    let kv: Arc<dyn KvStore> = Arc::new(JsonFileKv::open(&path, Quota::default()).unwrap());
    let store = ConfigStore::new(kv);
    assert!(store.get_config().await.unwrap().show_debug);
    assert_eq!(store.get_meetings(false).await.unwrap().len(), 1);
}
