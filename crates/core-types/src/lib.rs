use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Boundary error shared by the callwarden crates.
///
/// Crate-local error enums convert into this when they cross into a crate that does not
/// know their concrete type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WardenError {
    #[error("{message}")]
    Message { message: String },
}

impl WardenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Identifier of a browser tab/page hosting one call session.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PageId(pub String);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds since the unix epoch, negative for instants before 1970.
pub fn epoch_ms(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn now_ms() -> i64 {
    epoch_ms(Utc::now())
}

/// Distance from `now_ms` until `at_ms`; zero when `at_ms` already passed.
pub fn until(at_ms: i64, now_ms: i64) -> Duration {
    if at_ms <= now_ms {
        Duration::ZERO
    } else {
        Duration::from_millis((at_ms - now_ms) as u64)
    }
}
