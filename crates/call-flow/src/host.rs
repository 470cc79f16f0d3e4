use async_trait::async_trait;
use callwarden_config_store::MeetingConfig;
use callwarden_core_types::WardenError;

/// Everything a call flow needs from outside its own tab.
#[async_trait]
pub trait SessionHost: Send + Sync {
    async fn load_config(&self) -> Result<MeetingConfig, WardenError>;

    /// Marks the scheduled meeting behind this tab completed. A tab that was never
    /// scheduled is not an error.
    async fn complete_meeting(
        &self,
        url: &str,
        scheduled_time: Option<i64>,
        reason: &str,
    ) -> Result<(), WardenError>;

    /// Terminates the tab when the leave control cannot be used.
    async fn force_close(&self) -> Result<(), WardenError>;

    /// Mirror of a session log line for the host's own log.
    async fn debug_log(&self, _line: &str) {}
}
