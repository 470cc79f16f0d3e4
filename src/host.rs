//! In-process background: store, alarms and the message bus serving [`Background`].

use std::sync::Arc;

use callwarden_config_store::{Clock, ConfigStore, JsonFileKv, KvStore, SystemClock};
use callwarden_event_bus::{MessageBus, Request, Response};
use callwarden_scheduler::{FiredAlarm, SchedulerGateway, TokioAlarms};
use cdp_adapter::Cdp;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::background::Background;
use crate::errors::HostError;
use crate::settings::Settings;

const BUS_CAPACITY: usize = 64;

pub struct LocalHost {
    bus: MessageBus,
    background: Arc<Background>,
    alarms: Arc<TokioAlarms>,
    cancel: CancellationToken,
    server: JoinHandle<()>,
}

impl LocalHost {
    /// Opens the file store named by `settings` and seeds it.
    pub async fn open_store(settings: &Settings) -> Result<Arc<ConfigStore>, HostError> {
        let kv: Arc<dyn KvStore> =
            Arc::new(JsonFileKv::open(&settings.store.path, settings.quota())?);
        let store =
            ConfigStore::new(kv).with_platform_host(settings.platform.host.clone());
        store.initialize().await?;
        debug!(path = %settings.store.path.display(), "store opened");
        Ok(Arc::new(store))
    }

    /// Starts serving requests. Fired alarms arrive on the returned receiver; whoever
    /// holds it decides what a due meeting means (the daemon opens a tab).
    pub fn start(
        store: Arc<ConfigStore>,
        cdp: Option<Arc<dyn Cdp>>,
    ) -> (Self, mpsc::UnboundedReceiver<FiredAlarm>) {
        Self::start_with_clock(store, cdp, Arc::new(SystemClock))
    }

    pub fn start_with_clock(
        store: Arc<ConfigStore>,
        cdp: Option<Arc<dyn Cdp>>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<FiredAlarm>) {
        let (alarms, fired) = TokioAlarms::new(clock);
        let alarms = Arc::new(alarms);
        let gateway = Arc::new(SchedulerGateway::new(alarms.clone(), store));
        let (bus, endpoint) = MessageBus::new(BUS_CAPACITY);
        let mut background = Background::new(gateway, bus.clone());
        if let Some(cdp) = cdp {
            background = background.with_native_input(cdp);
        }
        let background = Arc::new(background);
        let cancel = CancellationToken::new();
        let server = tokio::spawn(endpoint.serve(background.clone(), cancel.clone()));
        let host = Self {
            bus,
            background,
            alarms,
            cancel,
            server,
        };
        (host, fired)
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn background(&self) -> &Arc<Background> {
        &self.background
    }

    pub fn gateway(&self) -> &Arc<SchedulerGateway> {
        self.background.gateway()
    }

    /// Sends `request` the way a tab or the popup would.
    pub async fn request(&self, request: Request) -> Response {
        self.bus.request(request.into_envelope()).await
    }

    pub async fn shutdown(self) {
        self.alarms.shutdown();
        self.cancel.cancel();
        if let Err(err) = self.server.await {
            debug!(%err, "bus server ended abnormally");
        }
        let alarms = callwarden_scheduler::metrics::snapshot();
        info!(
            alarms_registered = alarms.registered,
            alarms_replaced = alarms.replaced,
            alarms_fired = alarms.fired,
            alarms_cancelled = alarms.cancelled,
            "background stopped"
        );
    }
}
