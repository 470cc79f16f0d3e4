use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ClickMetrics {
    ok: AtomicU64,
    ineffective: AtomicU64,
    raised: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClickMetricsSnapshot {
    pub ok: u64,
    pub ineffective: u64,
    pub raised: u64,
}

impl ClickMetrics {
    pub fn record_ok(&self) {
        self.ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ineffective(&self) {
        self.ineffective.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_raised(&self) {
        self.raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ClickMetricsSnapshot {
        ClickMetricsSnapshot {
            ok: self.ok.load(Ordering::Relaxed),
            ineffective: self.ineffective.load(Ordering::Relaxed),
            raised: self.raised.load(Ordering::Relaxed),
        }
    }
}
