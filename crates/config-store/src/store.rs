use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::config::MeetingConfig;
use crate::errors::StoreError;
use crate::kv::KvStore;
use crate::meetings::{self, Inserted, ScheduledMeeting};

pub const CONFIG_KEY: &str = "config";
pub const MEETINGS_KEY: &str = "meetings";
pub const DEFAULT_PLATFORM_HOST: &str = "meet.google.com";

/// Outcome of [`ConfigStore::schedule_meeting`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub meeting: ScheduledMeeting,
    pub added: bool,
    pub evicted: Vec<ScheduledMeeting>,
}

/// Owner of the persisted `config` and `meetings` keys.
///
/// Writes from this handle are serialized; writers in other processes sharing the same
/// backing file still race with last-writer-wins semantics.
pub struct ConfigStore {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    platform_host: String,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            clock: Arc::new(SystemClock),
            platform_host: DEFAULT_PLATFORM_HOST.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_platform_host(mut self, host: impl Into<String>) -> Self {
        self.platform_host = host.into();
        self
    }

    pub fn platform_host(&self) -> &str {
        &self.platform_host
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Seeds default config and an empty meeting list when absent.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.kv.get(CONFIG_KEY).await?.is_none() {
            info!("seeding default meeting config");
            self.kv
                .set(CONFIG_KEY, MeetingConfig::default().to_value())
                .await?;
        }
        if self.kv.get(MEETINGS_KEY).await?.is_none() {
            self.kv.set(MEETINGS_KEY, Value::Array(Vec::new())).await?;
        }
        Ok(())
    }

    pub async fn get_config(&self) -> Result<MeetingConfig, StoreError> {
        let stored = self.kv.get(CONFIG_KEY).await?;
        Ok(MeetingConfig::from_stored(stored.as_ref()))
    }

    /// Merges `patch` (a JSON object) into the stored config and returns what was
    /// written.
    #[instrument(skip_all)]
    pub async fn update_config(&self, patch: &Value) -> Result<MeetingConfig, StoreError> {
        let patch = patch.as_object().ok_or(StoreError::InvalidUpdate)?;
        let _guard = self.write_lock.lock().await;
        let next = self.get_config().await?.merged(patch);
        self.kv.set(CONFIG_KEY, next.to_value()).await?;
        debug!(?next, "config updated");
        Ok(next)
    }

    pub async fn reset_config(&self) -> Result<MeetingConfig, StoreError> {
        let _guard = self.write_lock.lock().await;
        let cfg = MeetingConfig::default();
        self.kv.set(CONFIG_KEY, cfg.to_value()).await?;
        Ok(cfg)
    }

    pub async fn get_meetings(
        &self,
        include_completed: bool,
    ) -> Result<Vec<ScheduledMeeting>, StoreError> {
        let mut list = self.load_meetings().await?;
        if !include_completed {
            list.retain(|m| !m.completed);
        }
        Ok(list)
    }

    /// Records a future join. The URL must point at the platform host and `time` must
    /// be strictly in the future.
    #[instrument(skip(self))]
    pub async fn schedule_meeting(
        &self,
        url: &str,
        time: i64,
    ) -> Result<ScheduleOutcome, StoreError> {
        self.validate_url(url)?;
        if time <= self.clock.now_ms() {
            return Err(StoreError::NotInFuture(time));
        }
        let _guard = self.write_lock.lock().await;
        let mut list = self.load_meetings().await?;
        let meeting = ScheduledMeeting::new(url, time);
        let Inserted { added, evicted } = meetings::insert(&mut list, meeting.clone());
        if added {
            self.store_meetings(&list).await?;
        }
        info!(added, evicted = evicted.len(), "meeting scheduled");
        Ok(ScheduleOutcome {
            meeting,
            added,
            evicted,
        })
    }

    pub async fn remove_meeting(&self, url: &str, time: i64) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load_meetings().await?;
        let Some(idx) = list.iter().position(|m| m.same_slot(url, time)) else {
            return Ok(false);
        };
        list.remove(idx);
        self.store_meetings(&list).await?;
        Ok(true)
    }

    /// Marks the matching incomplete entry completed with `reason`. `Ok(None)` when no
    /// entry matches (an unscheduled session, or one already completed).
    #[instrument(skip(self))]
    pub async fn complete_meeting(
        &self,
        url: &str,
        time: Option<i64>,
        reason: &str,
    ) -> Result<Option<ScheduledMeeting>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load_meetings().await?;
        let now = self.clock.now_ms();
        let Some(idx) = meetings::completion_target(&list, url, time, now) else {
            debug!("no open meeting to complete");
            return Ok(None);
        };
        list[idx].completed = true;
        list[idx].exit_reason = Some(reason.to_string());
        let done = list[idx].clone();
        self.store_meetings(&list).await?;
        info!(time = done.time, "meeting completed");
        Ok(Some(done))
    }

    /// Purges completed entries older than 30 days.
    pub async fn cleanup_old_meetings(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load_meetings().await?;
        let removed = meetings::sweep(&mut list, self.clock.now_ms());
        if removed > 0 {
            self.store_meetings(&list).await?;
        }
        info!(removed, "retention sweep finished");
        Ok(removed)
    }

    /// Accepts only http(s) URLs whose host is the platform host.
    pub fn validate_url(&self, raw: &str) -> Result<Url, StoreError> {
        let url = Url::parse(raw).map_err(|err| StoreError::InvalidUrl(format!("{raw}: {err}")))?;
        let scheme_ok = matches!(url.scheme(), "https" | "http");
        let host_ok = url
            .host_str()
            .map(|h| h.eq_ignore_ascii_case(&self.platform_host))
            .unwrap_or(false);
        if !scheme_ok || !host_ok {
            return Err(StoreError::InvalidUrl(format!(
                "{raw}: expected a {} link",
                self.platform_host
            )));
        }
        Ok(url)
    }

    async fn load_meetings(&self) -> Result<Vec<ScheduledMeeting>, StoreError> {
        let stored = self.kv.get(MEETINGS_KEY).await?;
        Ok(meetings::decode_list(stored.as_ref()))
    }

    async fn store_meetings(&self, list: &[ScheduledMeeting]) -> Result<(), StoreError> {
        self.kv
            .set(MEETINGS_KEY, serde_json::to_value(list)?)
            .await
    }
}
