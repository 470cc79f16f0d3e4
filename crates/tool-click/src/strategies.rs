//! Click strategies, tried in order by the runner.

use async_trait::async_trait;

use action_primitives::{ActionError, DomPort, ElementRef, NativeInput, POINTER_SEQUENCE};

/// Page access handed to each strategy.
pub struct ClickDeps<'a> {
    pub dom: &'a dyn DomPort,
    pub native: Option<&'a dyn NativeInput>,
}

#[async_trait]
pub trait ClickStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, el: &ElementRef, deps: &ClickDeps<'_>) -> Result<(), ActionError>;
}

/// Trusted browser-level click at the element's center.
pub struct NativeClick;

#[async_trait]
impl ClickStrategy for NativeClick {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn attempt(&self, el: &ElementRef, deps: &ClickDeps<'_>) -> Result<(), ActionError> {
        let native = deps
            .native
            .ok_or_else(|| ActionError::NativeInput("no native input relay".into()))?;
        let rect = deps
            .dom
            .bounding_box(el)
            .await?
            .ok_or_else(|| ActionError::Detached(el.to_string()))?;
        if rect.is_empty() {
            return Err(ActionError::NotClickable(format!("{el} has no area")));
        }
        let (x, y) = rect.center();
        native.native_click(x.round(), y.round()).await
    }
}

/// `HTMLElement.click()`.
pub struct DomActivate;

#[async_trait]
impl ClickStrategy for DomActivate {
    fn name(&self) -> &'static str {
        "dom-activate"
    }

    async fn attempt(&self, el: &ElementRef, deps: &ClickDeps<'_>) -> Result<(), ActionError> {
        deps.dom.activate(el).await
    }
}

/// pointerover → pointerdown → pointerup → click.
pub struct PointerSequence;

#[async_trait]
impl ClickStrategy for PointerSequence {
    fn name(&self) -> &'static str {
        "pointer-sequence"
    }

    async fn attempt(&self, el: &ElementRef, deps: &ClickDeps<'_>) -> Result<(), ActionError> {
        deps.dom.dispatch_events(el, &POINTER_SEQUENCE).await
    }
}

pub fn default_chain() -> Vec<Box<dyn ClickStrategy>> {
    vec![
        Box::new(NativeClick),
        Box::new(DomActivate),
        Box::new(PointerSequence),
    ]
}
