//! Chromium DevTools Protocol adapter.
//!
//! Owns the browser process (or an attached remote browser), keeps a registry of the
//! pages it opened and exposes the small command surface the automation layers use:
//! page lifecycle, `Runtime.evaluate` and trusted `Input.dispatchMouseEvent` clicks.

use std::{env, path::PathBuf};

use which::which;

pub mod adapter;
pub mod metrics;
pub mod registry;

pub use adapter::{Cdp, CdpAdapter};
pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use events::RawEvent;

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    use callwarden_core_types::WardenError;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
    pub enum AdapterErrorKind {
        #[error("browser launch failed")]
        Launch,
        #[error("navigation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("page not found")]
        PageNotFound,
        #[error("script evaluation failed")]
        Script,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        /// The page is gone (tab closed or navigated away from the target).
        pub fn is_page_gone(&self) -> bool {
            matches!(self.kind, AdapterErrorKind::PageNotFound)
        }
    }

    impl From<AdapterError> for WardenError {
        fn from(err: AdapterError) -> Self {
            WardenError::new(err.to_string())
        }
    }
}

pub mod events {
    use callwarden_core_types::PageId;
    use serde::{Deserialize, Serialize};

    /// Page lifecycle notifications emitted by the adapter.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub enum RawEvent {
        PageOpened { page: PageId, url: String, ts: i64 },
        PageClosed { page: PageId, ts: i64 },
        Error { page: Option<PageId>, message: String },
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// Configuration for launching or attaching to the browser.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        pub websocket_url: Option<String>,
        pub default_deadline_ms: u64,
        /// Extra command-line switches appended to the launch.
        pub extra_args: Vec<String>,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: default_chrome_path(),
                user_data_dir: default_profile_dir(),
                headless: resolve_headless_default(),
                websocket_url: resolve_ws_url(),
                default_deadline_ms: 30_000,
                extra_args: default_media_args(),
            }
        }
    }

    impl CdpConfig {
        /// Launch arguments the meeting page needs: media prompts auto-accepted with fake
        /// devices so the pre-join screen renders its toggles.
        pub fn launch_args(&self) -> Vec<String> {
            let mut args = vec!["--no-first-run".to_string()];
            for arg in &self.extra_args {
                if !args.contains(arg) {
                    args.push(arg.clone());
                }
            }
            args
        }
    }

    fn default_media_args() -> Vec<String> {
        vec![
            "--use-fake-ui-for-media-stream".to_string(),
            "--use-fake-device-for-media-stream".to_string(),
            "--autoplay-policy=no-user-gesture-required".to_string(),
        ]
    }

    fn resolve_headless_default() -> bool {
        // "0", "false", "no", "off" means headful
        match env::var("CALLWARDEN_HEADLESS") {
            Ok(value) => {
                let lower = value.to_ascii_lowercase();
                !matches!(lower.as_str(), "0" | "false" | "no" | "off")
            }
            Err(_) => false,
        }
    }

    fn resolve_ws_url() -> Option<String> {
        env::var("CALLWARDEN_WS_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn default_chrome_path() -> PathBuf {
        detect_chrome_executable().unwrap_or_default()
    }

    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = env::var("CALLWARDEN_CHROME_PROFILE") {
            return PathBuf::from(path);
        }

        let default = Path::new("./.callwarden-profile");
        default.into()
    }
}

pub(crate) fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("CALLWARDEN_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    let skip_defaults = env::var("CALLWARDEN_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);

    if !skip_defaults {
        for candidate in os_specific_chrome_paths() {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(value) = env::var(key) {
                let root = PathBuf::from(value.trim());
                paths.push(root.join("Google/Chrome/Application/chrome.exe"));
                paths.push(root.join("Chromium/Application/chrome.exe"));
            }
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{chrome_executable_names, detect_chrome_executable};
    use std::{env, fs};
    use tempfile::tempdir;

    #[test]
    fn detects_from_env_var() {
        let dir = tempdir().unwrap();
        let exe_path = dir.path().join("my-chrome");
        fs::write(&exe_path, b"").unwrap();
        let original = env::var("CALLWARDEN_CHROME").ok();
        env::set_var("CALLWARDEN_CHROME", exe_path.to_string_lossy().to_string());
        let detected = detect_chrome_executable();
        if let Some(value) = original {
            env::set_var("CALLWARDEN_CHROME", value);
        } else {
            env::remove_var("CALLWARDEN_CHROME");
        }
        assert_eq!(detected, Some(exe_path));
    }

    #[test]
    fn executable_names_are_not_empty() {
        assert!(!chrome_executable_names().is_empty());
    }

    #[test]
    fn launch_args_dedupe_extras() {
        let mut cfg = super::CdpConfig::default();
        cfg.extra_args.push("--no-first-run".to_string());
        let args = cfg.launch_args();
        assert_eq!(
            args.iter().filter(|arg| *arg == "--no-first-run").count(),
            1
        );
        assert!(args.iter().any(|arg| arg == "--use-fake-ui-for-media-stream"));
    }
}
