//! DOM primitives shared by the locator and the action executors.
//!
//! - [`DomPort`]: script-level access to a page (query, mutation sequence, attributes,
//!   activation, text entry, overlays)
//! - [`NativeInput`]: trusted pointer input at viewport coordinates
//! - [`CdpPage`]: both ports over a live tab through the CDP adapter
//! - [`InMemoryPage`]: both ports over a scripted fake document

mod cdp_page;
pub mod errors;
pub mod memory;
mod ports;
pub mod types;

pub use cdp_page::CdpPage;
pub use errors::*;
pub use memory::{ClickChannel, ClickEffect, FakeElement, InMemoryPage, PageEvent};
pub use ports::*;
pub use types::*;
