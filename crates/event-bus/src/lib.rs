//! Messaging between the background handler, running sessions and the CLI.
//!
//! Requests travel as [`Envelope`]s over a [`MessageBus`] and are answered with a
//! [`Response`]; notifications such as `CONFIG_UPDATED` are broadcast to every
//! subscriber.

mod bus;
pub mod errors;
pub mod message;

pub use bus::{BusEndpoint, Event, EventBus, InMemoryBus, MessageBus, MessageHandler};
pub use errors::MessageError;
pub use message::{Envelope, MessageType, Request, Response, ToggleFlag};
