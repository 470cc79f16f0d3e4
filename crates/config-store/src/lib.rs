//! Persisted meeting configuration and scheduled-meeting history.
//!
//! Two keys live in a [`KvStore`]: `config` (a [`MeetingConfig`]) and `meetings` (a
//! time-ordered list of [`ScheduledMeeting`], capped at 50). [`ConfigStore`] applies the
//! sanitation and list rules on every write.

pub mod clock;
pub mod config;
pub mod errors;
pub mod kv;
pub mod meetings;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExitMode, MeetingConfig, CONFIG_KEYS};
pub use errors::StoreError;
pub use kv::{InMemoryKv, JsonFileKv, KvStore, Quota};
pub use meetings::{ScheduledMeeting, MAX_MEETINGS, RETENTION_MS};
pub use store::{ConfigStore, ScheduleOutcome, CONFIG_KEY, DEFAULT_PLATFORM_HOST, MEETINGS_KEY};
