use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use callwarden_config_store::ConfigStore;
use callwarden_scheduler::FiredAlarm;
use cdp_adapter::Cdp;
use tokio::sync::{mpsc, OnceCell};

use crate::host::LocalHost;
use crate::settings::Settings;

pub struct CliContext {
    settings: Arc<Settings>,
    settings_path: PathBuf,
    store: OnceCell<Arc<ConfigStore>>,
}

impl CliContext {
    pub fn new(settings: Settings, settings_path: PathBuf) -> Self {
        Self {
            settings: Arc::new(settings),
            settings_path,
            store: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        self.settings.as_ref()
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// The persisted store, opened and seeded on first use.
    pub async fn store(&self) -> Result<Arc<ConfigStore>> {
        self.store
            .get_or_try_init(|| async {
                LocalHost::open_store(&self.settings)
                    .await
                    .with_context(|| {
                        format!(
                            "opening store {}",
                            self.settings.store.path.display()
                        )
                    })
            })
            .await
            .map(Arc::clone)
    }

    /// Starts an in-process background over the store. Pass `cdp` when sessions will
    /// ask it for trusted clicks.
    pub async fn local_host(
        &self,
        cdp: Option<Arc<dyn Cdp>>,
    ) -> Result<(LocalHost, mpsc::UnboundedReceiver<FiredAlarm>)> {
        let store = self.store().await?;
        Ok(LocalHost::start(store, cdp))
    }
}
