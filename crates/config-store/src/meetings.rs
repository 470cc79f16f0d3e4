//! Scheduled-meeting records and the list rules applied on every write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const MAX_MEETINGS: usize = 50;
pub const RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMeeting {
    pub url: String,
    /// Epoch milliseconds.
    pub time: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<String>,
}

impl ScheduledMeeting {
    pub fn new(url: impl Into<String>, time: i64) -> Self {
        Self {
            url: url.into(),
            time,
            completed: false,
            exit_reason: None,
        }
    }

    pub fn same_slot(&self, url: &str, time: i64) -> bool {
        self.url == url && self.time == time
    }
}

/// Result of inserting into the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inserted {
    /// `false` when `(url, time)` was already present.
    pub added: bool,
    /// Entries dropped to stay within [`MAX_MEETINGS`], oldest first.
    pub evicted: Vec<ScheduledMeeting>,
}

/// Decodes the stored list, skipping entries that do not parse.
pub fn decode_list(value: Option<&Value>) -> Vec<ScheduledMeeting> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(meeting) => Some(meeting),
            Err(err) => {
                warn!(%err, "skipping malformed meeting entry");
                None
            }
        })
        .collect()
}

/// Adds the slot unless present, keeps the list sorted by time and trims the oldest
/// entries beyond the cap.
pub fn insert(list: &mut Vec<ScheduledMeeting>, meeting: ScheduledMeeting) -> Inserted {
    if list.iter().any(|m| m.same_slot(&meeting.url, meeting.time)) {
        return Inserted {
            added: false,
            evicted: Vec::new(),
        };
    }
    list.push(meeting);
    list.sort_by_key(|m| m.time);
    let overflow = list.len().saturating_sub(MAX_MEETINGS);
    let evicted = list.drain(..overflow).collect();
    Inserted {
        added: true,
        evicted,
    }
}

/// Picks the entry a session exit should complete.
///
/// With an exact time only that slot qualifies. Otherwise the latest incomplete entry
/// for the URL that has already started wins, falling back to the earliest upcoming one.
pub fn completion_target(
    list: &[ScheduledMeeting],
    url: &str,
    time: Option<i64>,
    now_ms: i64,
) -> Option<usize> {
    let open = |m: &ScheduledMeeting| m.url == url && !m.completed;
    if let Some(time) = time {
        return list.iter().position(|m| open(m) && m.time == time);
    }
    let started = list
        .iter()
        .enumerate()
        .filter(|(_, m)| open(m) && m.time <= now_ms)
        .max_by_key(|(_, m)| m.time)
        .map(|(idx, _)| idx);
    started.or_else(|| {
        list.iter()
            .enumerate()
            .filter(|(_, m)| open(m))
            .min_by_key(|(_, m)| m.time)
            .map(|(idx, _)| idx)
    })
}

/// Drops completed entries older than the retention window; returns how many went.
pub fn sweep(list: &mut Vec<ScheduledMeeting>, now_ms: i64) -> usize {
    let cutoff = now_ms - RETENTION_MS;
    let before = list.len();
    list.retain(|m| !m.completed || m.time > cutoff);
    before - list.len()
}
