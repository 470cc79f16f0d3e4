use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::output::LogFormat;
use crate::settings::Settings;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILES_KEPT: usize = 14;

pub fn init_logging(
    level: &str,
    debug: bool,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let (human, json) = match format {
        LogFormat::Human => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_current_span(true))),
    };

    let file = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("callwarden")
                .filename_suffix("log")
                .max_log_files(LOG_FILES_KEPT)
                .build(dir)
                .context("Failed to create log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(human)
        .with(json)
        .with(file)
        .init();

    Ok(())
}

pub struct LoadedSettings {
    pub settings: Settings,
    pub path: PathBuf,
}

/// Lookup order: `--config`, `./config/callwarden.yaml`, then the user config dir.
pub async fn load_settings(config_path: Option<&PathBuf>) -> Result<LoadedSettings> {
    let path = match config_path {
        Some(path) => path.clone(),
        None => {
            let local = PathBuf::from("config/callwarden.yaml");
            if local.exists() {
                local
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("callwarden");
                path.push("config.yaml");
                path
            }
        }
    };

    if path.exists() {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings = Settings::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        info!("Loaded settings from: {}", path.display());
        Ok(LoadedSettings { settings, path })
    } else {
        warn!("Settings file not found, using defaults: {}", path.display());
        Ok(LoadedSettings {
            settings: Settings::default(),
            path,
        })
    }
}
