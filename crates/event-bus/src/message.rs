//! Wire envelopes and the typed requests they carry.

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::MessageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ScheduleMeeting,
    UpdateConfig,
    GetConfig,
    GetMeetings,
    CompleteMeeting,
    RemoveMeetingAlarm,
    ToggleDebug,
    ToggleExitInfo,
    ToggleAutoExit,
    ConfigUpdated,
    NativeClick,
    DebugLog,
}

impl MessageType {
    pub const ALL: [MessageType; 12] = [
        MessageType::ScheduleMeeting,
        MessageType::UpdateConfig,
        MessageType::GetConfig,
        MessageType::GetMeetings,
        MessageType::CompleteMeeting,
        MessageType::RemoveMeetingAlarm,
        MessageType::ToggleDebug,
        MessageType::ToggleExitInfo,
        MessageType::ToggleAutoExit,
        MessageType::ConfigUpdated,
        MessageType::NativeClick,
        MessageType::DebugLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::ScheduleMeeting => "SCHEDULE_MEETING",
            MessageType::UpdateConfig => "UPDATE_CONFIG",
            MessageType::GetConfig => "GET_CONFIG",
            MessageType::GetMeetings => "GET_MEETINGS",
            MessageType::CompleteMeeting => "COMPLETE_MEETING",
            MessageType::RemoveMeetingAlarm => "REMOVE_MEETING_ALARM",
            MessageType::ToggleDebug => "TOGGLE_DEBUG",
            MessageType::ToggleExitInfo => "TOGGLE_EXIT_INFO",
            MessageType::ToggleAutoExit => "TOGGLE_AUTO_EXIT",
            MessageType::ConfigUpdated => "CONFIG_UPDATED",
            MessageType::NativeClick => "NATIVE_CLICK",
            MessageType::DebugLog => "DEBUG_LOG",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MessageError::UnknownType(s.to_string()))
    }
}

/// `{"type": …, "data": …, "sender": …}`. The type stays a string so unknown
/// messages still decode and can be answered with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl Envelope {
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            data,
            sender: None,
        }
    }

    pub fn bare(kind: MessageType) -> Self {
        Self::new(kind, Value::Null)
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn message_type(&self) -> Result<MessageType, MessageError> {
        self.kind.parse()
    }
}

/// `{success, data?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn err(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Config flags flipped by the toggle messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleFlag {
    Debug,
    ExitInfo,
    AutoExit,
}

impl ToggleFlag {
    pub fn config_key(&self) -> &'static str {
        match self {
            ToggleFlag::Debug => "showDebug",
            ToggleFlag::ExitInfo => "showExitInfo",
            ToggleFlag::AutoExit => "autoExitEnabled",
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            ToggleFlag::Debug => MessageType::ToggleDebug,
            ToggleFlag::ExitInfo => MessageType::ToggleExitInfo,
            ToggleFlag::AutoExit => MessageType::ToggleAutoExit,
        }
    }
}

/// Decoded request payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ScheduleMeeting { url: String, time: i64 },
    UpdateConfig(Map<String, Value>),
    GetConfig,
    GetMeetings { include_completed: bool },
    CompleteMeeting {
        url: String,
        time: Option<i64>,
        exit_reason: String,
    },
    RemoveMeetingAlarm { url: String, time: i64 },
    Toggle { flag: ToggleFlag, enabled: Option<bool> },
    NativeClick { x: i64, y: i64 },
    DebugLog { message: String },
    ConfigUpdated(Value),
}

impl Request {
    pub fn parse(envelope: &Envelope) -> Result<Request, MessageError> {
        let kind = envelope.message_type()?;
        let data = &envelope.data;
        let name = kind.as_str();
        let request = match kind {
            MessageType::ScheduleMeeting => Request::ScheduleMeeting {
                url: required_str(data, "url", name)?,
                time: required_time(data, "time", name)?,
            },
            MessageType::UpdateConfig => Request::UpdateConfig(
                data.as_object()
                    .cloned()
                    .ok_or_else(|| MessageError::invalid(name, "expected an object"))?,
            ),
            MessageType::GetConfig => Request::GetConfig,
            MessageType::GetMeetings => Request::GetMeetings {
                include_completed: data
                    .get("includeCompleted")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            MessageType::CompleteMeeting => Request::CompleteMeeting {
                url: required_str(data, "url", name)?,
                time: optional_time(data, "time", name)?,
                exit_reason: data
                    .get("exitReason")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified")
                    .to_string(),
            },
            MessageType::RemoveMeetingAlarm => Request::RemoveMeetingAlarm {
                url: required_str(data, "url", name)?,
                time: required_time(data, "time", name)?,
            },
            MessageType::ToggleDebug => toggle(ToggleFlag::Debug, data),
            MessageType::ToggleExitInfo => toggle(ToggleFlag::ExitInfo, data),
            MessageType::ToggleAutoExit => toggle(ToggleFlag::AutoExit, data),
            MessageType::NativeClick => Request::NativeClick {
                x: required_int(data, "x", name)?,
                y: required_int(data, "y", name)?,
            },
            MessageType::DebugLog => Request::DebugLog {
                message: match data {
                    Value::String(s) => s.clone(),
                    other => other
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| other.to_string()),
                },
            },
            MessageType::ConfigUpdated => Request::ConfigUpdated(data.clone()),
        };
        Ok(request)
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Request::ScheduleMeeting { .. } => MessageType::ScheduleMeeting,
            Request::UpdateConfig(_) => MessageType::UpdateConfig,
            Request::GetConfig => MessageType::GetConfig,
            Request::GetMeetings { .. } => MessageType::GetMeetings,
            Request::CompleteMeeting { .. } => MessageType::CompleteMeeting,
            Request::RemoveMeetingAlarm { .. } => MessageType::RemoveMeetingAlarm,
            Request::Toggle { flag, .. } => flag.message_type(),
            Request::NativeClick { .. } => MessageType::NativeClick,
            Request::DebugLog { .. } => MessageType::DebugLog,
            Request::ConfigUpdated(_) => MessageType::ConfigUpdated,
        }
    }

    /// Encodes back into an envelope with the same wire shape [`Request::parse`] reads.
    pub fn into_envelope(self) -> Envelope {
        let kind = self.message_type();
        let data = match self {
            Request::ScheduleMeeting { url, time } | Request::RemoveMeetingAlarm { url, time } => {
                serde_json::json!({ "url": url, "time": time })
            }
            Request::UpdateConfig(map) => Value::Object(map),
            Request::GetConfig => Value::Null,
            Request::GetMeetings { include_completed } => {
                serde_json::json!({ "includeCompleted": include_completed })
            }
            Request::CompleteMeeting {
                url,
                time,
                exit_reason,
            } => {
                let mut data = serde_json::json!({ "url": url, "exitReason": exit_reason });
                if let (Some(time), Some(obj)) = (time, data.as_object_mut()) {
                    obj.insert("time".into(), Value::from(time));
                }
                data
            }
            Request::Toggle { enabled, .. } => match enabled {
                Some(enabled) => serde_json::json!({ "enabled": enabled }),
                None => Value::Null,
            },
            Request::NativeClick { x, y } => serde_json::json!({ "x": x, "y": y }),
            Request::DebugLog { message } => serde_json::json!({ "message": message }),
            Request::ConfigUpdated(config) => config,
        };
        Envelope::new(kind, data)
    }
}

fn toggle(flag: ToggleFlag, data: &Value) -> Request {
    Request::Toggle {
        flag,
        enabled: data.get("enabled").and_then(Value::as_bool),
    }
}

fn required_str(data: &Value, key: &str, kind: &'static str) -> Result<String, MessageError> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MessageError::invalid(kind, format!("missing string field '{key}'")))
}

fn required_int(data: &Value, key: &str, kind: &'static str) -> Result<i64, MessageError> {
    let raw = data
        .get(key)
        .ok_or_else(|| MessageError::invalid(kind, format!("missing field '{key}'")))?;
    raw.as_i64()
        .or_else(|| raw.as_f64().map(|f| f.round() as i64))
        .ok_or_else(|| MessageError::invalid(kind, format!("field '{key}' is not a number")))
}

fn required_time(data: &Value, key: &str, kind: &'static str) -> Result<i64, MessageError> {
    optional_time(data, key, kind)?
        .ok_or_else(|| MessageError::invalid(kind, format!("missing field '{key}'")))
}

/// Epoch milliseconds, or an RFC 3339 timestamp string.
fn optional_time(data: &Value, key: &str, kind: &'static str) -> Result<Option<i64>, MessageError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| MessageError::invalid(kind, format!("field '{key}' out of range"))),
        Some(Value::String(s)) => {
            if let Ok(ms) = s.trim().parse::<i64>() {
                return Ok(Some(ms));
            }
            DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| Some(dt.timestamp_millis()))
                .map_err(|err| MessageError::invalid(kind, format!("field '{key}': {err}")))
        }
        Some(_) => Err(MessageError::invalid(
            kind,
            format!("field '{key}' must be a number or timestamp"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_shape() {
        let env: Envelope =
            serde_json::from_value(json!({"type": "NATIVE_CLICK", "data": {"x": 10.4, "y": 20}}))
                .unwrap();
        assert_eq!(
            Request::parse(&env).unwrap(),
            Request::NativeClick { x: 10, y: 20 }
        );
        let out = serde_json::to_value(Envelope::bare(MessageType::GetConfig)).unwrap();
        assert_eq!(out, json!({"type": "GET_CONFIG"}));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let env: Envelope = serde_json::from_value(json!({"type": "PING"})).unwrap();
        assert_eq!(
            Request::parse(&env),
            Err(MessageError::UnknownType("PING".into()))
        );
    }

    #[test]
    fn schedule_accepts_rfc3339_time() {
        let env = Envelope::new(
            MessageType::ScheduleMeeting,
            json!({"url": "https://meet.google.com/x", "time": "2030-01-01T10:00:00Z"}),
        );
        let Request::ScheduleMeeting { time, .. } = Request::parse(&env).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(time, 1_893_492_000_000);
    }

    #[test]
    fn schedule_without_url_is_rejected() {
        let env = Envelope::new(MessageType::ScheduleMeeting, json!({"time": 5}));
        assert!(matches!(
            Request::parse(&env),
            Err(MessageError::InvalidPayload { kind: "SCHEDULE_MEETING", .. })
        ));
    }

    #[test]
    fn toggle_enabled_is_optional() {
        let flip = Request::parse(&Envelope::bare(MessageType::ToggleAutoExit)).unwrap();
        assert_eq!(
            flip,
            Request::Toggle {
                flag: ToggleFlag::AutoExit,
                enabled: None
            }
        );
        let set = Request::parse(&Envelope::new(
            MessageType::ToggleDebug,
            json!({"enabled": true}),
        ))
        .unwrap();
        assert_eq!(
            set,
            Request::Toggle {
                flag: ToggleFlag::Debug,
                enabled: Some(true)
            }
        );
    }

    #[test]
    fn complete_meeting_round_trips_through_envelope() {
        let req = Request::CompleteMeeting {
            url: "https://meet.google.com/x".into(),
            time: Some(42),
            exit_reason: "Timer expired".into(),
        };
        assert_eq!(Request::parse(&req.clone().into_envelope()).unwrap(), req);
    }

    #[test]
    fn response_omits_absent_fields() {
        assert_eq!(
            serde_json::to_value(Response::done()).unwrap(),
            json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(Response::err("boom")).unwrap(),
            json!({"success": false, "error": "boom"})
        );
    }
}
