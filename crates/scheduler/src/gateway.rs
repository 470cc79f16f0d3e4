use std::sync::Arc;

use callwarden_config_store::{ConfigStore, ScheduleOutcome};
use tracing::{info, instrument, warn};

use crate::error::SchedulerError;
use crate::facility::AlarmFacility;
use crate::model::{Alarm, AlarmKind, FiredAlarm, MeetingKey, SWEEP_ALARM, SWEEP_PERIOD};

/// What the host should do about a fired alarm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlarmAction {
    OpenMeeting(MeetingKey),
    /// Retention sweep ran and removed this many entries.
    Swept(usize),
}

/// Keeps the meeting list in the store and the alarm facility in step.
pub struct SchedulerGateway {
    alarms: Arc<dyn AlarmFacility>,
    store: Arc<ConfigStore>,
}

impl SchedulerGateway {
    pub fn new(alarms: Arc<dyn AlarmFacility>, store: Arc<ConfigStore>) -> Self {
        Self { alarms, store }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Records the meeting and (re)registers its alarm. Entries evicted by the list cap
    /// lose their alarms too.
    #[instrument(skip(self))]
    pub async fn schedule(&self, url: &str, time: i64) -> Result<ScheduleOutcome, SchedulerError> {
        let outcome = self.store.schedule_meeting(url, time).await?;
        for gone in &outcome.evicted {
            self.alarms
                .cancel(&MeetingKey::new(&gone.url, gone.time).alarm_name());
        }
        let self_evicted = outcome
            .evicted
            .iter()
            .any(|m| m.same_slot(&outcome.meeting.url, outcome.meeting.time));
        if self_evicted {
            warn!("meeting is older than every retained entry; no alarm registered");
        } else {
            self.alarms
                .register(&MeetingKey::new(url, time).alarm_name(), time);
        }
        Ok(outcome)
    }

    pub async fn unschedule(&self, url: &str, time: i64) -> Result<bool, SchedulerError> {
        self.alarms
            .cancel(&MeetingKey::new(url, time).alarm_name());
        Ok(self.store.remove_meeting(url, time).await?)
    }

    /// Rebuilds alarms from the store: every incomplete future meeting plus the daily
    /// sweep. Returns the number of meeting alarms registered.
    pub async fn restore(&self) -> Result<usize, SchedulerError> {
        self.alarms.clear_all();
        let now = self.store.now_ms();
        let mut restored = 0;
        for meeting in self.store.get_meetings(false).await? {
            if meeting.time > now {
                self.alarms.register(
                    &MeetingKey::new(&meeting.url, meeting.time).alarm_name(),
                    meeting.time,
                );
                restored += 1;
            }
        }
        self.install_sweep();
        info!(restored, "alarms restored");
        Ok(restored)
    }

    pub fn install_sweep(&self) {
        let first = self.store.now_ms() + SWEEP_PERIOD.as_millis() as i64;
        self.alarms
            .register_recurring(SWEEP_ALARM, first, SWEEP_PERIOD);
    }

    pub fn pending(&self) -> Vec<Alarm> {
        self.alarms.pending()
    }

    /// Interprets a fired alarm, running the sweep inline.
    pub async fn resolve(&self, fired: &FiredAlarm) -> Result<AlarmAction, SchedulerError> {
        match AlarmKind::from_name(&fired.name)? {
            AlarmKind::Meeting(key) => Ok(AlarmAction::OpenMeeting(key)),
            AlarmKind::Sweep => Ok(AlarmAction::Swept(
                self.store.cleanup_old_meetings().await?,
            )),
        }
    }
}
