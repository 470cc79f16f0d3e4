use std::time::Duration;

use callwarden::simulate_counts;
use callwarden_config_store::MeetingConfig;
use serde_json::json;

const STEP: Duration = Duration::from_millis(250);

fn config(patch: serde_json::Value) -> MeetingConfig {
    MeetingConfig::default().merged(patch.as_object().unwrap())
}

#[tokio::test(start_paused = true)]
async fn leaves_at_the_first_count_at_or_below_the_minimum() {
    let cfg = config(json!({ "exitMode": "participants", "minParticipants": 2 }));
    let report = simulate_counts(&cfg, &[10, 8, 5, 3, 2, 1], STEP).await.unwrap();

    assert!(report.armed);
    assert_eq!(report.exit_index, Some(4));
    assert_eq!(report.exit_count, Some(2));
    assert_eq!(report.reason.as_deref(), Some("Minimum participants reached"));
    assert_eq!(report.peak, 10);
    assert_eq!(report.completions, 1);
    assert!(report.left);
}

#[tokio::test(start_paused = true)]
async fn peak_mode_measures_against_the_highest_count_seen() {
    let cfg = config(json!({ "exitMode": "peak", "peakPercentage": 50 }));
    let report = simulate_counts(&cfg, &[4, 10, 6, 5], STEP).await.unwrap();

    assert_eq!(report.exit_index, Some(3));
    assert_eq!(report.exit_count, Some(5));
    assert_eq!(report.reason.as_deref(), Some("Peak percentage threshold reached"));
    assert_eq!(report.peak, 10);
}

#[tokio::test(start_paused = true)]
async fn counts_that_stay_high_never_exit() {
    let cfg = config(json!({ "exitMode": "participants", "minParticipants": 2 }));
    let report = simulate_counts(&cfg, &[6, 5, 4, 3], STEP).await.unwrap();

    assert!(report.armed);
    assert_eq!(report.exit_index, None);
    assert_eq!(report.completions, 0);
    assert!(!report.left);
}

#[tokio::test(start_paused = true)]
async fn disabled_automatic_exit_arms_nothing() {
    let cfg = config(json!({ "exitMode": "participants", "autoExitEnabled": false }));
    let report = simulate_counts(&cfg, &[1, 1], STEP).await.unwrap();
    assert!(!report.armed);
    assert_eq!(report.exit_index, None);
    assert_eq!(report.completions, 0);
}

#[tokio::test(start_paused = true)]
async fn timer_mode_and_empty_input_are_rejected() {
    let timer = MeetingConfig::default();
    assert!(simulate_counts(&timer, &[3, 2], STEP).await.is_err());

    let cfg = config(json!({ "exitMode": "participants" }));
    assert!(simulate_counts(&cfg, &[], STEP).await.is_err());
}
