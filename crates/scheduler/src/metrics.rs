use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    registered: AtomicU64,
    replaced: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_registered(replaced: bool) {
    increment(&COUNTERS.registered);
    if replaced {
        increment(&COUNTERS.replaced);
    }
}

pub fn record_fired() {
    increment(&COUNTERS.fired);
}

pub fn record_cancelled() {
    increment(&COUNTERS.cancelled);
}

#[derive(Clone, Debug, Default)]
pub struct AlarmMetricsSnapshot {
    pub registered: u64,
    pub replaced: u64,
    pub fired: u64,
    pub cancelled: u64,
}

/// Process-wide counters, shared by every facility instance.
pub fn snapshot() -> AlarmMetricsSnapshot {
    AlarmMetricsSnapshot {
        registered: COUNTERS.registered.load(Ordering::Relaxed),
        replaced: COUNTERS.replaced.load(Ordering::Relaxed),
        fired: COUNTERS.fired.load(Ordering::Relaxed),
        cancelled: COUNTERS.cancelled.load(Ordering::Relaxed),
    }
}
