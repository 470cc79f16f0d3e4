use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use callwarden_core_types::WardenError;

use crate::errors::MessageError;
use crate::message::{Envelope, Response};

/// Trait implemented by payload types that can be carried on a broadcast bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), WardenError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// In-memory broadcast bus.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    /// Fails only when nobody is subscribed.
    async fn publish(&self, event: E) -> Result<(), WardenError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|err| WardenError::new(err.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Background-side handler for request envelopes.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Response;
}

struct PendingRequest {
    envelope: Envelope,
    reply: oneshot::Sender<Response>,
}

/// Request/response channel to the background plus a notification broadcast.
#[derive(Clone)]
pub struct MessageBus {
    requests: mpsc::Sender<PendingRequest>,
    notifications: Arc<InMemoryBus<Envelope>>,
}

/// Receiving end of [`MessageBus`], owned by whoever runs the background handler.
pub struct BusEndpoint {
    requests: mpsc::Receiver<PendingRequest>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> (Self, BusEndpoint) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let bus = Self {
            requests: tx,
            notifications: InMemoryBus::new(capacity),
        };
        (bus, BusEndpoint { requests: rx })
    }

    /// Sends a request and waits for the handler's reply.
    pub async fn send(&self, envelope: Envelope) -> Result<Response, MessageError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(PendingRequest { envelope, reply })
            .await
            .map_err(|_| MessageError::Disconnected)?;
        rx.await.map_err(|_| MessageError::Disconnected)
    }

    /// Like [`MessageBus::send`], folding transport failures into an error response.
    pub async fn request(&self, envelope: Envelope) -> Response {
        match self.send(envelope).await {
            Ok(response) => response,
            Err(err) => Response::err(err),
        }
    }

    /// Broadcasts to every subscriber; returns whether anyone was listening.
    pub async fn notify(&self, envelope: Envelope) -> bool {
        debug!(kind = %envelope.kind, "broadcasting notification");
        self.notifications.publish(envelope).await.is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.notifications.subscribe()
    }
}

impl BusEndpoint {
    pub async fn recv(&mut self) -> Option<(Envelope, oneshot::Sender<Response>)> {
        self.requests
            .recv()
            .await
            .map(|pending| (pending.envelope, pending.reply))
    }

    /// Dispatches every request to `handler` on its own task until `cancel` fires or all
    /// senders are gone.
    pub async fn serve<H>(mut self, handler: Arc<H>, cancel: CancellationToken)
    where
        H: MessageHandler + ?Sized + 'static,
    {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.requests.recv() => next,
            };
            let Some(PendingRequest { envelope, reply }) = next else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let kind = envelope.kind.clone();
                let response = handler.handle(envelope).await;
                if reply.send(response).is_err() {
                    warn!(%kind, "requester went away before the reply");
                }
            });
        }
        debug!("message endpoint stopped");
    }
}
