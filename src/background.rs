//! The background handler: the one place that writes the store, owns the alarms and
//! issues trusted input on behalf of sessions.

use std::sync::Arc;

use async_trait::async_trait;
use callwarden_config_store::{ConfigStore, MeetingConfig};
use callwarden_core_types::PageId;
use callwarden_event_bus::{
    Envelope, MessageBus, MessageHandler, MessageType, Request, Response, ToggleFlag,
};
use callwarden_scheduler::SchedulerGateway;
use cdp_adapter::Cdp;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::errors::HostError;

pub struct Background {
    gateway: Arc<SchedulerGateway>,
    bus: MessageBus,
    cdp: Option<Arc<dyn Cdp>>,
}

impl Background {
    pub fn new(gateway: Arc<SchedulerGateway>, bus: MessageBus) -> Self {
        Self {
            gateway,
            bus,
            cdp: None,
        }
    }

    /// Enables `NATIVE_CLICK`, dispatched to the sender's page.
    pub fn with_native_input(mut self, cdp: Arc<dyn Cdp>) -> Self {
        self.cdp = Some(cdp);
        self
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        self.gateway.store()
    }

    pub fn gateway(&self) -> &Arc<SchedulerGateway> {
        &self.gateway
    }

    /// Runs one decoded request. `Value::Null` means success without data.
    #[instrument(skip(self, request), fields(kind = %request.message_type()))]
    pub async fn dispatch(
        &self,
        request: Request,
        sender: Option<&str>,
    ) -> Result<Value, HostError> {
        match request {
            Request::ScheduleMeeting { url, time } => {
                let outcome = self.gateway.schedule(&url, time).await?;
                info!(%url, time, added = outcome.added, "meeting scheduled");
                Ok(json!({
                    "meeting": outcome.meeting,
                    "added": outcome.added,
                    "evicted": outcome.evicted.len(),
                }))
            }
            Request::UpdateConfig(patch) => {
                let config = self.store().update_config(&Value::Object(patch)).await?;
                self.broadcast_config(&config).await;
                Ok(serde_json::to_value(config)?)
            }
            Request::GetConfig => Ok(serde_json::to_value(self.store().get_config().await?)?),
            Request::GetMeetings { include_completed } => {
                let meetings = self.store().get_meetings(include_completed).await?;
                Ok(serde_json::to_value(meetings)?)
            }
            Request::CompleteMeeting {
                url,
                time,
                exit_reason,
            } => {
                let completed = self
                    .store()
                    .complete_meeting(&url, time, &exit_reason)
                    .await?;
                match &completed {
                    Some(meeting) => {
                        info!(%url, time = meeting.time, reason = %exit_reason, "meeting completed")
                    }
                    None => debug!(%url, "completion for an unscheduled meeting"),
                }
                Ok(serde_json::to_value(completed)?)
            }
            Request::RemoveMeetingAlarm { url, time } => {
                let removed = self.gateway.unschedule(&url, time).await?;
                Ok(json!({ "removed": removed }))
            }
            Request::Toggle { flag, enabled } => {
                let config = self.toggle(flag, enabled).await?;
                Ok(serde_json::to_value(config)?)
            }
            Request::NativeClick { x, y } => {
                self.native_click(sender, x, y).await?;
                Ok(Value::Null)
            }
            Request::DebugLog { message } => {
                debug!(target: "callwarden::page", sender = sender.unwrap_or("-"), "{message}");
                Ok(Value::Null)
            }
            Request::ConfigUpdated(_) => {
                Err(HostError::NotARequest(MessageType::ConfigUpdated.as_str()))
            }
        }
    }

    /// Sets the flag, or flips it when `enabled` is absent.
    async fn toggle(
        &self,
        flag: ToggleFlag,
        enabled: Option<bool>,
    ) -> Result<MeetingConfig, HostError> {
        let next = match enabled {
            Some(value) => value,
            None => {
                let current = self.store().get_config().await?;
                !match flag {
                    ToggleFlag::Debug => current.show_debug,
                    ToggleFlag::ExitInfo => current.show_exit_info,
                    ToggleFlag::AutoExit => current.auto_exit_enabled,
                }
            }
        };
        let mut patch = Map::new();
        patch.insert(flag.config_key().to_string(), Value::Bool(next));
        let config = self.store().update_config(&Value::Object(patch)).await?;
        info!(flag = flag.config_key(), enabled = next, "flag toggled");
        self.broadcast_config(&config).await;
        Ok(config)
    }

    async fn native_click(&self, sender: Option<&str>, x: i64, y: i64) -> Result<(), HostError> {
        let cdp = self
            .cdp
            .as_ref()
            .ok_or_else(|| HostError::NativeInput("no browser attached".into()))?;
        let page = sender
            .map(|id| PageId(id.to_string()))
            .ok_or_else(|| HostError::NativeInput("request carries no sender page".into()))?;
        cdp.dispatch_click(&page, x as f64, y as f64).await?;
        Ok(())
    }

    async fn broadcast_config(&self, config: &MeetingConfig) {
        let data = match serde_json::to_value(config) {
            Ok(data) => data,
            Err(err) => {
                warn!(%err, "config not serializable; skipping broadcast");
                return;
            }
        };
        if !self
            .bus
            .notify(Envelope::new(MessageType::ConfigUpdated, data))
            .await
        {
            debug!("no running sessions to notify");
        }
    }
}

#[async_trait]
impl MessageHandler for Background {
    async fn handle(&self, envelope: Envelope) -> Response {
        let request = match Request::parse(&envelope) {
            Ok(request) => request,
            Err(err) => {
                warn!(kind = %envelope.kind, %err, "rejected message");
                return Response::err(err);
            }
        };
        match self.dispatch(request, envelope.sender.as_deref()).await {
            Ok(Value::Null) => Response::done(),
            Ok(data) => Response::ok(data),
            Err(err) => {
                warn!(kind = %envelope.kind, %err, "request failed");
                Response::err(err)
            }
        }
    }
}
