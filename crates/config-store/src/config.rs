//! Meeting configuration and its sanitation rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which predicate governs automatic departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExitMode {
    #[default]
    Timer,
    Participants,
    Peak,
}

impl ExitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitMode::Timer => "timer",
            ExitMode::Participants => "participants",
            ExitMode::Peak => "peak",
        }
    }
}

impl fmt::Display for ExitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timer" => Ok(ExitMode::Timer),
            "participants" => Ok(ExitMode::Participants),
            "peak" => Ok(ExitMode::Peak),
            other => Err(format!("unknown exit mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingConfig {
    pub exit_mode: ExitMode,
    /// Minutes; `0` disables the timer.
    pub timer_duration: u32,
    pub min_participants: u32,
    /// Percent of the observed peak, 1..=100.
    pub peak_percentage: u32,
    /// Persisted and editable; nothing reads it.
    pub auto_react_threshold: u32,
    pub show_exit_info: bool,
    pub show_debug: bool,
    pub auto_exit_enabled: bool,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            exit_mode: ExitMode::Timer,
            timer_duration: 30,
            min_participants: 2,
            peak_percentage: 10,
            auto_react_threshold: 5,
            show_exit_info: true,
            show_debug: false,
            auto_exit_enabled: true,
        }
    }
}

/// Field names as they appear on the wire.
pub const CONFIG_KEYS: [&str; 8] = [
    "exitMode",
    "timerDuration",
    "minParticipants",
    "peakPercentage",
    "autoReactThreshold",
    "showExitInfo",
    "showDebug",
    "autoExitEnabled",
];

impl MeetingConfig {
    /// Applies `patch` on top of `self`. Keys missing from the patch keep their current
    /// value; keys present but unusable fall back to the default; integers are clamped
    /// into range.
    pub fn merged(&self, patch: &Map<String, Value>) -> MeetingConfig {
        let defaults = MeetingConfig::default();
        let mut next = self.clone();

        if let Some(raw) = patch.get("exitMode") {
            next.exit_mode = raw
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.exit_mode);
        }
        if let Some(raw) = patch.get("timerDuration") {
            next.timer_duration = clamp(parse_int(raw), defaults.timer_duration, 0, u32::MAX);
        }
        if let Some(raw) = patch.get("minParticipants") {
            next.min_participants =
                clamp(parse_int(raw), defaults.min_participants, 1, u32::MAX);
        }
        if let Some(raw) = patch.get("peakPercentage") {
            next.peak_percentage = clamp(parse_int(raw), defaults.peak_percentage, 1, 100);
        }
        if let Some(raw) = patch.get("autoReactThreshold") {
            next.auto_react_threshold =
                clamp(parse_int(raw), defaults.auto_react_threshold, 1, u32::MAX);
        }
        if let Some(raw) = patch.get("showExitInfo") {
            next.show_exit_info = raw.as_bool().unwrap_or(defaults.show_exit_info);
        }
        if let Some(raw) = patch.get("showDebug") {
            next.show_debug = raw.as_bool().unwrap_or(defaults.show_debug);
        }
        if let Some(raw) = patch.get("autoExitEnabled") {
            next.auto_exit_enabled = raw.as_bool().unwrap_or(defaults.auto_exit_enabled);
        }
        next
    }

    /// Reads whatever JSON is stored, tolerating partial or malformed documents.
    pub fn from_stored(value: Option<&Value>) -> MeetingConfig {
        match value.and_then(Value::as_object) {
            Some(map) => MeetingConfig::default().merged(map),
            None => MeetingConfig::default(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Wire value of a single field.
    pub fn field(&self, key: &str) -> Option<Value> {
        self.to_value().get(key).cloned()
    }
}

/// Integer in the manner of a lenient form field: JSON numbers are truncated, strings
/// contribute their leading integer (`"12px"` → 12); anything else is unusable.
fn parse_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => leading_int(s),
        _ => None,
    }
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn clamp(parsed: Option<i64>, default: u32, min: u32, max: u32) -> u32 {
    match parsed {
        Some(n) => n.clamp(min as i64, max as i64) as u32,
        None => default,
    }
}
