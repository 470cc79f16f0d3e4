use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use callwarden_config_store::Clock;
use callwarden_core_types::until;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::metrics;
use crate::model::{Alarm, FiredAlarm};

/// Named wall-clock alarms. Registering an existing name replaces it.
pub trait AlarmFacility: Send + Sync {
    /// One-shot alarm firing at or after `fire_at_ms`.
    fn register(&self, name: &str, fire_at_ms: i64);
    fn register_recurring(&self, name: &str, first_at_ms: i64, period: Duration);
    fn cancel(&self, name: &str) -> bool;
    fn clear_all(&self) -> usize;
    fn pending(&self) -> Vec<Alarm>;
}

struct AlarmEntry {
    alarm: Alarm,
    generation: u64,
    token: CancellationToken,
}

/// Alarm facility backed by tokio timers. Fired alarms are delivered on the channel
/// returned by [`TokioAlarms::new`]; nothing survives a process restart.
pub struct TokioAlarms {
    entries: Arc<DashMap<String, AlarmEntry>>,
    clock: Arc<dyn Clock>,
    fired: mpsc::UnboundedSender<FiredAlarm>,
    generation: AtomicU64,
    root: CancellationToken,
}

impl TokioAlarms {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<FiredAlarm>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let alarms = Self {
            entries: Arc::new(DashMap::new()),
            clock,
            fired: tx,
            generation: AtomicU64::new(0),
            root: CancellationToken::new(),
        };
        (alarms, rx)
    }

    /// Stops every timer task; later registrations are inert.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.entries.clear();
    }

    fn arm(&self, alarm: Alarm) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let name = alarm.name.clone();
        let previous = self.entries.insert(
            name.clone(),
            AlarmEntry {
                alarm: alarm.clone(),
                generation,
                token: token.clone(),
            },
        );
        let replaced = previous.is_some();
        if let Some(prev) = previous {
            prev.token.cancel();
        }
        metrics::record_registered(replaced);
        debug!(alarm = %name, fire_at_ms = alarm.fire_at_ms, replaced, "alarm registered");

        tokio::spawn(run_alarm(
            self.entries.clone(),
            self.clock.clone(),
            self.fired.clone(),
            alarm,
            generation,
            token,
        ));
    }
}

impl AlarmFacility for TokioAlarms {
    fn register(&self, name: &str, fire_at_ms: i64) {
        self.arm(Alarm {
            name: name.to_string(),
            fire_at_ms,
            period: None,
        });
    }

    fn register_recurring(&self, name: &str, first_at_ms: i64, period: Duration) {
        self.arm(Alarm {
            name: name.to_string(),
            fire_at_ms: first_at_ms,
            period: Some(period),
        });
    }

    fn cancel(&self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some((_, entry)) => {
                entry.token.cancel();
                metrics::record_cancelled();
                true
            }
            None => false,
        }
    }

    fn clear_all(&self) -> usize {
        let names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.iter().filter(|name| self.cancel(name)).count()
    }

    fn pending(&self) -> Vec<Alarm> {
        let mut alarms: Vec<Alarm> = self.entries.iter().map(|e| e.alarm.clone()).collect();
        alarms.sort_by(|a, b| a.fire_at_ms.cmp(&b.fire_at_ms).then(a.name.cmp(&b.name)));
        alarms
    }
}

async fn run_alarm(
    entries: Arc<DashMap<String, AlarmEntry>>,
    clock: Arc<dyn Clock>,
    fired: mpsc::UnboundedSender<FiredAlarm>,
    alarm: Alarm,
    generation: u64,
    token: CancellationToken,
) {
    let mut fire_at = alarm.fire_at_ms;
    loop {
        let wait = until(fire_at, clock.now_ms());
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
        let fired_at = clock.now_ms();
        let scheduled_for = fire_at;

        match alarm.period {
            None => {
                entries.remove_if(&alarm.name, |_, entry| entry.generation == generation);
            }
            Some(period) => {
                fire_at = fire_at.max(fired_at) + period.as_millis() as i64;
                if let Some(mut entry) = entries.get_mut(&alarm.name) {
                    if entry.generation == generation {
                        entry.alarm.fire_at_ms = fire_at;
                    }
                }
            }
        }

        metrics::record_fired();
        trace!(alarm = %alarm.name, scheduled_for, fired_at, "alarm fired");
        let delivered = fired
            .send(FiredAlarm {
                name: alarm.name.clone(),
                scheduled_for_ms: scheduled_for,
                fired_at_ms: fired_at,
            })
            .is_ok();
        if !delivered || alarm.period.is_none() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callwarden_config_store::Clock;

    /// Wall clock that follows tokio's (possibly paused) time.
    struct TokioClock {
        base_ms: i64,
        start: tokio::time::Instant,
    }

    impl TokioClock {
        fn new(base_ms: i64) -> Arc<Self> {
            Arc::new(Self {
                base_ms,
                start: tokio::time::Instant::now(),
            })
        }
    }

    impl Clock for TokioClock {
        fn now_ms(&self) -> i64 {
            self.base_ms + self.start.elapsed().as_millis() as i64
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once_and_leaves_pending() {
        let (alarms, mut rx) = TokioAlarms::new(TokioClock::new(1_000));
        alarms.register("a", 6_000);
        assert_eq!(alarms.pending().len(), 1);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.name, "a");
        assert!(fired.fired_at_ms >= 6_000);
        assert!(alarms.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_moves_the_fire_time() {
        let (alarms, mut rx) = TokioAlarms::new(TokioClock::new(0));
        alarms.register("a", 1_000);
        alarms.register("a", 9_000);
        assert_eq!(alarms.pending()[0].fire_at_ms, 9_000);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.scheduled_for_ms, 9_000);
        assert!(fired.fired_at_ms >= 9_000);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_alarm_never_fires() {
        let (alarms, mut rx) = TokioAlarms::new(TokioClock::new(0));
        alarms.register("a", 1_000);
        alarms.register("b", 2_000);
        assert!(alarms.cancel("a"));
        assert!(!alarms.cancel("a"));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.name, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_alarm_keeps_firing() {
        let (alarms, mut rx) = TokioAlarms::new(TokioClock::new(0));
        alarms.register_recurring("sweep", 100, Duration::from_millis(500));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.scheduled_for_ms, 100);
        assert!(second.scheduled_for_ms >= 600);
        assert_eq!(alarms.pending().len(), 1);
        assert_eq!(alarms.clear_all(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn past_due_alarm_fires_immediately() {
        let (alarms, mut rx) = TokioAlarms::new(TokioClock::new(10_000));
        alarms.register("late", 5_000);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.fired_at_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_shows_up_in_the_alarm_counters() {
        let before = crate::metrics::snapshot();
        let (alarms, mut rx) = TokioAlarms::new(TokioClock::new(0));
        alarms.register("kept", 1_000);
        alarms.register("kept", 2_000);
        alarms.register("dropped", 3_000);
        assert!(alarms.cancel("dropped"));
        rx.recv().await.unwrap();

        // Counters are process-wide; other tests may add to them concurrently.
        let after = crate::metrics::snapshot();
        assert!(after.registered >= before.registered + 3);
        assert!(after.replaced > before.replaced);
        assert!(after.cancelled > before.cancelled);
        assert!(after.fired > before.fired);
    }
}
