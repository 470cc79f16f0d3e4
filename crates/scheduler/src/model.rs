use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchedulerError;

/// Name of the recurring alarm that drives the retention sweep.
pub const SWEEP_ALARM: &str = "callwarden.retention-sweep";
pub const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// The `(url, time)` pair a meeting alarm is keyed on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingKey {
    pub url: String,
    pub scheduled_time: i64,
}

impl MeetingKey {
    pub fn new(url: impl Into<String>, scheduled_time: i64) -> Self {
        Self {
            url: url.into(),
            scheduled_time,
        }
    }

    /// `{"url":"…","scheduledTime":…}`, fields in that order.
    pub fn alarm_name(&self) -> String {
        format!(
            "{{\"url\":{},\"scheduledTime\":{}}}",
            Value::String(self.url.clone()),
            self.scheduled_time
        )
    }

    pub fn from_alarm_name(name: &str) -> Result<Self, SchedulerError> {
        serde_json::from_str(name).map_err(|_| SchedulerError::InvalidAlarmName(name.to_string()))
    }
}

/// What a fired alarm stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlarmKind {
    Meeting(MeetingKey),
    Sweep,
}

impl AlarmKind {
    pub fn from_name(name: &str) -> Result<Self, SchedulerError> {
        if name == SWEEP_ALARM {
            return Ok(AlarmKind::Sweep);
        }
        MeetingKey::from_alarm_name(name).map(AlarmKind::Meeting)
    }

    pub fn name(&self) -> String {
        match self {
            AlarmKind::Meeting(key) => key.alarm_name(),
            AlarmKind::Sweep => SWEEP_ALARM.to_string(),
        }
    }
}

/// A registered alarm as reported by [`crate::AlarmFacility::pending`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alarm {
    pub name: String,
    pub fire_at_ms: i64,
    pub period: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FiredAlarm {
    pub name: String,
    pub scheduled_for_ms: i64,
    pub fired_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_name_keeps_field_order() {
        let key = MeetingKey::new("https://meet.google.com/abc-defg-hij", 1_700_000_000_000);
        assert_eq!(
            key.alarm_name(),
            r#"{"url":"https://meet.google.com/abc-defg-hij","scheduledTime":1700000000000}"#
        );
        assert_eq!(MeetingKey::from_alarm_name(&key.alarm_name()).unwrap(), key);
    }

    #[test]
    fn url_is_escaped() {
        let key = MeetingKey::new("https://meet.google.com/a\"b", 5);
        assert_eq!(MeetingKey::from_alarm_name(&key.alarm_name()).unwrap(), key);
    }

    #[test]
    fn foreign_names_are_errors() {
        assert_eq!(
            AlarmKind::from_name("cleanup"),
            Err(SchedulerError::InvalidAlarmName("cleanup".into()))
        );
        assert_eq!(AlarmKind::from_name(SWEEP_ALARM), Ok(AlarmKind::Sweep));
    }
}
