//! Application settings, read from YAML.
//!
//! Every section is optional; missing keys take the defaults below. The meeting
//! configuration (exit mode and thresholds) is not here: it lives in the store and is
//! edited through messages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use action_locator::{LocatorError, RoleMap};
use callwarden_call_flow::{ChatTexts, FlowTimings};
use callwarden_config_store::{Quota, DEFAULT_PLATFORM_HOST};
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};
use tool_click::ClickPolicy;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub browser: BrowserSettings,
    pub store: StoreSettings,
    pub platform: PlatformSettings,
    pub timings: TimingSettings,
    pub chat: ChatSettings,
}

/// Overrides applied on top of the adapter defaults, which already honor
/// `CALLWARDEN_CHROME`, `CALLWARDEN_HEADLESS` and `CALLWARDEN_WS_URL`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub headless: Option<bool>,
    pub user_data_dir: Option<PathBuf>,
    pub websocket_url: Option<String>,
    pub extra_args: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub per_item_bytes: usize,
    pub total_bytes: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let quota = Quota::default();
        Self {
            path: default_store_path(),
            per_item_bytes: quota.per_item_bytes,
            total_bytes: quota.total_bytes,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub host: String,
    /// YAML role map replacing the built-in selectors.
    pub role_map: Option<PathBuf>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_PLATFORM_HOST.to_string(),
            role_map: None,
        }
    }
}

/// All values in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub page_load_delay_ms: u64,
    pub locate_timeout_ms: u64,
    pub join_attempt_timeout_ms: u64,
    pub join_attempts: u32,
    pub retry_pause_ms: u64,
    pub settle_delay_ms: u64,
    pub verification_settle_ms: u64,
    pub chat_delay_ms: u64,
    pub chat_attempts: u32,
    pub chat_locate_timeout_ms: u64,
    pub tick_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let flow = FlowTimings::default();
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            page_load_delay_ms: ms(flow.page_load_delay),
            locate_timeout_ms: ms(flow.locate_timeout),
            join_attempt_timeout_ms: ms(flow.join_attempt_timeout),
            join_attempts: flow.join_attempts,
            retry_pause_ms: ms(flow.retry_pause),
            settle_delay_ms: ms(flow.settle_delay),
            verification_settle_ms: ClickPolicy::default().settle_ms,
            chat_delay_ms: ms(flow.chat_delay),
            chat_attempts: flow.chat_attempts,
            chat_locate_timeout_ms: ms(flow.chat_locate_timeout),
            tick_ms: ms(flow.tick),
        }
    }
}

impl TimingSettings {
    pub fn flow(&self) -> FlowTimings {
        FlowTimings {
            page_load_delay: Duration::from_millis(self.page_load_delay_ms),
            locate_timeout: Duration::from_millis(self.locate_timeout_ms),
            join_attempt_timeout: Duration::from_millis(self.join_attempt_timeout_ms),
            join_attempts: self.join_attempts.max(1),
            retry_pause: Duration::from_millis(self.retry_pause_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            chat_delay: Duration::from_millis(self.chat_delay_ms),
            chat_attempts: self.chat_attempts,
            chat_locate_timeout: Duration::from_millis(self.chat_locate_timeout_ms),
            tick: Duration::from_millis(self.tick_ms.max(100)),
        }
    }

    pub fn click_policy(&self) -> ClickPolicy {
        ClickPolicy {
            settle_ms: self.verification_settle_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub greeting: String,
    pub farewell: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        let texts = ChatTexts::default();
        Self {
            greeting: texts.greeting,
            farewell: texts.farewell,
        }
    }
}

impl Settings {
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn cdp_config(&self) -> CdpConfig {
        let mut cfg = CdpConfig::default();
        let browser = &self.browser;
        if let Some(executable) = &browser.executable {
            cfg.executable = executable.clone();
        }
        if let Some(headless) = browser.headless {
            cfg.headless = headless;
        }
        if let Some(dir) = &browser.user_data_dir {
            cfg.user_data_dir = dir.clone();
        }
        if browser.websocket_url.is_some() {
            cfg.websocket_url = browser.websocket_url.clone();
        }
        cfg.extra_args.extend(browser.extra_args.iter().cloned());
        cfg
    }

    pub fn quota(&self) -> Quota {
        Quota {
            per_item_bytes: self.store.per_item_bytes,
            total_bytes: self.store.total_bytes,
        }
    }

    /// The configured role map, or the built-in one.
    pub fn role_map(&self) -> Result<RoleMap, LocatorError> {
        match &self.platform.role_map {
            Some(path) => RoleMap::load(path),
            None => Ok(RoleMap::builtin()),
        }
    }

    pub fn chat_texts(&self) -> ChatTexts {
        ChatTexts {
            greeting: self.chat.greeting.clone(),
            farewell: self.chat.farewell.clone(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("callwarden"))
        .unwrap_or_else(|| Path::new(".callwarden").to_path_buf())
        .join("store.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let settings = Settings::from_yaml_str("").unwrap();
        assert_eq!(settings.platform.host, "meet.google.com");
        assert_eq!(settings.timings.flow(), FlowTimings::default());
        assert_eq!(settings.timings.click_policy().settle_ms, 2000);
        assert_eq!(settings.chat_texts(), ChatTexts::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let raw = r#"
timings:
  join_attempts: 2
  settle_delay_ms: 1500
chat:
  greeting: "Olá"
browser:
  headless: true
  extra_args: ["--mute-audio"]
"#;
        let settings = Settings::from_yaml_str(raw).unwrap();
        let flow = settings.timings.flow();
        assert_eq!(flow.join_attempts, 2);
        assert_eq!(flow.settle_delay, Duration::from_millis(1500));
        assert_eq!(flow.retry_pause, FlowTimings::default().retry_pause);
        assert_eq!(settings.chat.greeting, "Olá");
        assert_eq!(settings.chat.farewell, "Goodbye");

        let cdp = settings.cdp_config();
        assert!(cdp.headless);
        assert!(cdp.launch_args().iter().any(|arg| arg == "--mute-audio"));
    }

    #[test]
    fn role_map_file_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roles.yaml");
        let mut map = RoleMap::builtin();
        map.join_labels = vec!["Ask to join".to_string()];
        std::fs::write(&path, map.to_yaml().unwrap()).unwrap();

        let settings = Settings {
            platform: PlatformSettings {
                role_map: Some(path),
                ..PlatformSettings::default()
            },
            ..Settings::default()
        };
        assert_eq!(settings.role_map().unwrap().join_labels, vec!["Ask to join"]);
    }
}
