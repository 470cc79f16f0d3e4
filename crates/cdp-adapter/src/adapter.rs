use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use callwarden_core_types::{now_ms, PageId};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::RawEvent;
use crate::metrics;
use crate::registry::Registry;

/// Command surface the automation layers rely on.
#[async_trait]
pub trait Cdp: Send + Sync {
    async fn create_page(&self, url: &str) -> Result<PageId, AdapterError>;
    async fn close_page(&self, page: &PageId) -> Result<(), AdapterError>;
    /// Evaluates `expression`, awaiting a returned promise, and yields the JSON value.
    async fn evaluate_script(&self, page: &PageId, expression: &str)
        -> Result<Value, AdapterError>;
    /// Trusted left click at viewport coordinates.
    async fn dispatch_click(&self, page: &PageId, x: f64, y: f64) -> Result<(), AdapterError>;
}

/// chromiumoxide-backed adapter. Launches a local browser or attaches to
/// `websocket_url` when one is configured.
pub struct CdpAdapter {
    cfg: CdpConfig,
    browser: Mutex<Option<Browser>>,
    registry: Registry<Page>,
    events: broadcast::Sender<RawEvent>,
    cancel: CancellationToken,
    handler_task: Mutex<Option<JoinHandle<()>>>,
}

impl CdpAdapter {
    pub fn new(cfg: CdpConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            cfg,
            browser: Mutex::new(None),
            registry: Registry::new(),
            events,
            cancel: CancellationToken::new(),
            handler_task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.events.subscribe()
    }

    #[instrument(skip(self), fields(headless = self.cfg.headless))]
    pub async fn start(&self) -> Result<(), AdapterError> {
        let mut guard = self.browser.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (browser, mut handler) = match &self.cfg.websocket_url {
            Some(ws) => {
                info!(%ws, "attaching to running browser");
                Browser::connect(ws.clone()).await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Launch)
                        .with_hint(format!("connect {ws}: {err}"))
                })?
            }
            None => {
                let browser_cfg = self.browser_config()?;
                info!(
                    executable = %self.cfg.executable.display(),
                    profile = %self.cfg.user_data_dir.display(),
                    "launching browser"
                );
                Browser::launch(browser_cfg).await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Launch).with_hint(err.to_string())
                })?
            }
        };

        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = handler.next() => match next {
                        Some(Ok(())) => {}
                        Some(Err(err)) => debug!(?err, "cdp handler reported error"),
                        None => break,
                    },
                }
            }
            debug!("cdp handler loop finished");
        });

        *guard = Some(browser);
        *self.handler_task.lock().await = Some(task);
        Ok(())
    }

    fn browser_config(&self) -> Result<BrowserConfig, AdapterError> {
        if self.cfg.executable.as_os_str().is_empty() {
            return Err(AdapterError::new(AdapterErrorKind::Launch)
                .with_hint("no Chrome/Chromium executable found; set CALLWARDEN_CHROME"));
        }
        let mut builder = BrowserConfig::builder()
            .chrome_executable(self.cfg.executable.clone())
            .user_data_dir(self.cfg.user_data_dir.clone())
            .request_timeout(Duration::from_millis(self.cfg.default_deadline_ms))
            .args(self.cfg.launch_args());
        if !self.cfg.headless {
            builder = builder.with_head();
        }
        builder
            .build()
            .map_err(|err| AdapterError::new(AdapterErrorKind::Launch).with_hint(err))
    }

    pub async fn shutdown(&self) {
        for (page, handle) in self.registry.drain() {
            if let Err(err) = handle.close().await {
                debug!(%page, ?err, "closing page during shutdown failed");
            }
        }
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(err) = browser.close().await {
                warn!(?err, "browser close failed");
            }
        }
        self.cancel.cancel();
        if let Some(task) = self.handler_task.lock().await.take() {
            let _ = task.await;
        }
    }

    fn page(&self, page: &PageId) -> Result<Page, AdapterError> {
        self.registry.handle(page).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::PageNotFound).with_hint(page.to_string())
        })
    }

    fn emit(&self, event: RawEvent) {
        metrics::record_event();
        let _ = self.events.send(event);
    }

    async fn timed<T, F>(&self, method: &'static str, fut: F) -> Result<T, AdapterError>
    where
        F: std::future::Future<Output = Result<T, CdpError>>,
    {
        metrics::record_command(method);
        let started = Instant::now();
        match fut.await {
            Ok(value) => {
                metrics::record_command_success(method, started.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(map_cdp_error(method, err))
            }
        }
    }
}

fn map_cdp_error(method: &str, err: CdpError) -> AdapterError {
    let text = err.to_string();
    let lower = text.to_ascii_lowercase();
    if lower.contains("target closed")
        || lower.contains("no target")
        || lower.contains("session closed")
    {
        return AdapterError::new(AdapterErrorKind::PageNotFound)
            .with_hint(format!("{method}: {text}"));
    }
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::NavTimeout)
            .with_hint(method)
            .retriable(true),
        CdpError::JavascriptException(_) => {
            AdapterError::new(AdapterErrorKind::Script).with_hint(format!("{method}: {text}"))
        }
        _ => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("{method}: {text}"))
            .retriable(true),
    }
}

#[async_trait]
impl Cdp for CdpAdapter {
    async fn create_page(&self, url: &str) -> Result<PageId, AdapterError> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("browser not started")
            })?;
            self.timed("Target.createTarget", browser.new_page(url))
                .await?
        };
        let id = PageId::new();
        self.registry.insert_page(id.clone(), page);
        info!(page = %id, %url, "page opened");
        self.emit(RawEvent::PageOpened {
            page: id.clone(),
            url: url.to_string(),
            ts: now_ms(),
        });
        Ok(id)
    }

    async fn close_page(&self, page: &PageId) -> Result<(), AdapterError> {
        let handle = self.registry.remove_page(page).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::PageNotFound).with_hint(page.to_string())
        })?;
        let result = self.timed("Target.closeTarget", handle.close()).await;
        self.emit(RawEvent::PageClosed {
            page: page.clone(),
            ts: now_ms(),
        });
        result
    }

    async fn evaluate_script(
        &self,
        page: &PageId,
        expression: &str,
    ) -> Result<Value, AdapterError> {
        let handle = self.page(page)?;
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|err| AdapterError::new(AdapterErrorKind::Script).with_hint(err))?;
        let result = self
            .timed("Runtime.evaluate", handle.evaluate_expression(params))
            .await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn dispatch_click(&self, page: &PageId, x: f64, y: f64) -> Result<(), AdapterError> {
        let handle = self.page(page)?;
        let phases = [
            (DispatchMouseEventType::MouseMoved, false),
            (DispatchMouseEventType::MousePressed, true),
            (DispatchMouseEventType::MouseReleased, true),
        ];
        for (phase, with_button) in phases {
            let mut builder = DispatchMouseEventParams::builder().r#type(phase).x(x).y(y);
            if with_button {
                builder = builder.button(MouseButton::Left).click_count(1);
            }
            let params = builder
                .build()
                .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err))?;
            self.timed("Input.dispatchMouseEvent", handle.execute(params))
                .await?;
        }
        Ok(())
    }
}

impl Drop for CdpAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_page_is_reported_as_gone() {
        let adapter = CdpAdapter::new(CdpConfig::default());
        let err = adapter
            .evaluate_script(&PageId::new(), "1 + 1")
            .await
            .unwrap_err();
        assert!(err.is_page_gone());
    }

    #[tokio::test]
    async fn create_page_requires_started_browser() {
        let adapter = CdpAdapter::new(CdpConfig::default());
        let err = adapter.create_page("about:blank").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Internal);
        let err = adapter.close_page(&PageId::new()).await.unwrap_err();
        assert!(err.is_page_gone());
    }

    #[test]
    fn launch_without_executable_is_rejected() {
        let cfg = CdpConfig {
            executable: Default::default(),
            ..CdpConfig::default()
        };
        let adapter = CdpAdapter::new(cfg);
        let err = adapter.browser_config().unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Launch);
    }
}
