//! Port traits the locator and executors run against.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ActionError;
use crate::types::{ElementRef, Rect};

/// Script-level access to one page's document.
#[async_trait]
pub trait DomPort: Send + Sync {
    /// First attached element matching the candidates, tried in order.
    async fn query_first(&self, selectors: &[String]) -> Result<Option<ElementRef>, ActionError>;

    /// Monotonic counter bumped on every observed document mutation batch.
    async fn mutation_seq(&self) -> Result<u64, ActionError>;

    /// Resolves once the counter exceeds `after`, or when `timeout` elapses. Returns the
    /// counter value at resolution either way.
    async fn wait_for_mutation(&self, after: u64, timeout: Duration)
        -> Result<u64, ActionError>;

    async fn text_content(&self, el: &ElementRef) -> Result<Option<String>, ActionError>;

    async fn attribute(&self, el: &ElementRef, name: &str)
        -> Result<Option<String>, ActionError>;

    async fn is_attached(&self, el: &ElementRef) -> Result<bool, ActionError>;

    /// `None` when the element is detached.
    async fn bounding_box(&self, el: &ElementRef) -> Result<Option<Rect>, ActionError>;

    /// Direct `HTMLElement.click()`.
    async fn activate(&self, el: &ElementRef) -> Result<(), ActionError>;

    /// Dispatches the named events on the element in order.
    async fn dispatch_events(&self, el: &ElementRef, events: &[&str]) -> Result<(), ActionError>;

    /// Replaces the element's text (value or content) and fires `input`.
    async fn set_text(&self, el: &ElementRef, text: &str) -> Result<(), ActionError>;

    /// keydown/keypress/keyup for `key`.
    async fn press_key(&self, el: &ElementRef, key: &str) -> Result<(), ActionError>;

    /// Draws (or replaces) a fixed-position text overlay identified by `id`.
    async fn render_overlay(&self, id: &str, lines: &[String]) -> Result<(), ActionError>;

    async fn remove_overlay(&self, id: &str) -> Result<(), ActionError>;
}

/// Trusted, browser-level pointer input at viewport coordinates.
#[async_trait]
pub trait NativeInput: Send + Sync {
    async fn native_click(&self, x: f64, y: f64) -> Result<(), ActionError>;
}
