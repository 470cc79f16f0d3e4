//! Scripted in-memory page.
//!
//! Implements the same ports as [`crate::CdpPage`] over a flat list of fake elements so
//! locators, executors and whole call flows can be driven without a browser. Elements
//! match selectors by exact string, and each element declares which click channels it
//! reacts to and what a reacting click does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::errors::ActionError;
use crate::ports::{DomPort, NativeInput};
use crate::types::{ElementRef, Rect};

/// How a click reached the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickChannel {
    Native,
    Dom,
    Pointer,
}

/// What a click the element reacts to does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    None,
    Detach,
    SetAttribute { name: String, value: String },
    /// Flips the attribute between `"true"` and `"false"`.
    ToggleAttribute { name: String },
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub key: String,
    pub selectors: Vec<String>,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub rect: Rect,
    pub attached: bool,
    pub effect: ClickEffect,
    pub responds_to: Vec<ClickChannel>,
}

impl FakeElement {
    /// Attached 40x40 element at the origin reacting to every click channel.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            selectors: Vec::new(),
            text: String::new(),
            attributes: HashMap::new(),
            rect: Rect::new(0.0, 0.0, 40.0, 40.0),
            attached: true,
            effect: ClickEffect::None,
            responds_to: vec![ClickChannel::Native, ClickChannel::Dom, ClickChannel::Pointer],
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.effect = effect;
        self
    }

    pub fn responds_to(mut self, channels: &[ClickChannel]) -> Self {
        self.responds_to = channels.to_vec();
        self
    }
}

/// Observable interaction recorded by the page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Clicked { key: String, channel: ClickChannel },
    Dispatched { key: String, event: String },
    TextSet { key: String, text: String },
    KeyPressed { key: String, name: String },
    NativeClickMissed { x: f64, y: f64 },
}

#[derive(Default)]
struct PageState {
    elements: Vec<FakeElement>,
    events: Vec<PageEvent>,
    overlays: HashMap<String, Vec<String>>,
    closed: bool,
}

/// Cheaply cloneable handle; clones share the same document.
#[derive(Clone)]
pub struct InMemoryPage {
    state: Arc<Mutex<PageState>>,
    seq: Arc<watch::Sender<u64>>,
}

impl Default for InMemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPage {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(PageState::default())),
            seq: Arc::new(tx),
        }
    }

    fn current_seq(&self) -> u64 {
        *self.seq.borrow()
    }

    fn bump(&self) {
        self.seq.send_modify(|seq| *seq += 1);
    }

    /// Adds an element; counts as a mutation.
    pub fn insert(&self, element: FakeElement) {
        self.state.lock().elements.push(element);
        self.bump();
    }

    /// Applies `f` to the element with `key`; counts as a mutation when found.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut FakeElement)) -> bool {
        let found = {
            let mut state = self.state.lock();
            match state.elements.iter_mut().find(|el| el.key == key) {
                Some(el) => {
                    f(el);
                    true
                }
                None => false,
            }
        };
        if found {
            self.bump();
        }
        found
    }

    pub fn replace_text(&self, key: &str, text: impl Into<String>) -> bool {
        let text = text.into();
        self.update(key, |el| el.text = text)
    }

    pub fn set_attribute(&self, key: &str, name: &str, value: &str) -> bool {
        self.update(key, |el| {
            el.attributes.insert(name.to_string(), value.to_string());
        })
    }

    pub fn detach(&self, key: &str) -> bool {
        self.update(key, |el| el.attached = false)
    }

    /// Simulates the tab going away: every later call fails with `PageGone`.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.bump();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn attribute_of(&self, key: &str, name: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .find(|el| el.key == key)
            .and_then(|el| el.attributes.get(name).cloned())
    }

    pub fn is_attached_key(&self, key: &str) -> bool {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .any(|el| el.key == key && el.attached)
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.state.lock().events.clone()
    }

    pub fn clicks_on(&self, key: &str) -> Vec<ClickChannel> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PageEvent::Clicked { key: k, channel } if k == key => Some(channel),
                _ => None,
            })
            .collect()
    }

    /// Texts committed with Enter on the element with `key`.
    pub fn submitted_texts(&self, key: &str) -> Vec<String> {
        let mut pending: Option<String> = None;
        let mut out = Vec::new();
        for event in self.events() {
            match event {
                PageEvent::TextSet { key: k, text } if k == key => pending = Some(text),
                PageEvent::KeyPressed { key: k, name } if k == key && name == "Enter" => {
                    if let Some(text) = pending.take() {
                        out.push(text);
                    }
                }
                _ => {}
            }
        }
        out
    }

    pub fn overlay(&self, id: &str) -> Option<Vec<String>> {
        self.state.lock().overlays.get(id).cloned()
    }

    fn ensure_open(state: &PageState) -> Result<(), ActionError> {
        if state.closed {
            Err(ActionError::PageGone("in-memory page closed".into()))
        } else {
            Ok(())
        }
    }

    fn with_element<T>(
        &self,
        el: &ElementRef,
        f: impl FnOnce(&mut FakeElement, &mut Vec<PageEvent>) -> T,
    ) -> Result<T, ActionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        let PageState {
            elements, events, ..
        } = &mut *state;
        match elements.get_mut(el.id as usize) {
            Some(found) if found.attached => Ok(f(found, events)),
            _ => Err(ActionError::Detached(el.to_string())),
        }
    }

    /// Records the click and applies the element's effect when it reacts to `channel`.
    fn click(&self, el: &ElementRef, channel: ClickChannel) -> Result<(), ActionError> {
        let mutated = self.with_element(el, |found, events| {
            events.push(PageEvent::Clicked {
                key: found.key.clone(),
                channel,
            });
            if found.responds_to.contains(&channel) {
                apply_effect(found)
            } else {
                false
            }
        })?;
        if mutated {
            self.bump();
        }
        Ok(())
    }
}

fn apply_effect(el: &mut FakeElement) -> bool {
    match el.effect.clone() {
        ClickEffect::None => false,
        ClickEffect::Detach => {
            el.attached = false;
            true
        }
        ClickEffect::SetAttribute { name, value } => {
            el.attributes.insert(name, value);
            true
        }
        ClickEffect::ToggleAttribute { name } => {
            let next = match el.attributes.get(&name).map(String::as_str) {
                Some("true") => "false",
                _ => "true",
            };
            el.attributes.insert(name, next.to_string());
            true
        }
    }
}

#[async_trait]
impl DomPort for InMemoryPage {
    async fn query_first(&self, selectors: &[String]) -> Result<Option<ElementRef>, ActionError> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;
        for selector in selectors {
            let hit = state
                .elements
                .iter()
                .position(|el| el.attached && el.selectors.iter().any(|s| s == selector));
            if let Some(index) = hit {
                return Ok(Some(ElementRef {
                    id: index as u64,
                    selector: selector.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn mutation_seq(&self) -> Result<u64, ActionError> {
        Self::ensure_open(&self.state.lock())?;
        Ok(self.current_seq())
    }

    async fn wait_for_mutation(
        &self,
        after: u64,
        timeout: Duration,
    ) -> Result<u64, ActionError> {
        let mut rx = self.seq.subscribe();
        let wait = async {
            loop {
                let current = *rx.borrow_and_update();
                if current > after {
                    return current;
                }
                if rx.changed().await.is_err() {
                    return current;
                }
            }
        };
        let waited = tokio::time::timeout(timeout, wait).await;
        let seq = match waited {
            Ok(seq) => seq,
            Err(_) => self.current_seq(),
        };
        Self::ensure_open(&self.state.lock())?;
        Ok(seq)
    }

    async fn text_content(&self, el: &ElementRef) -> Result<Option<String>, ActionError> {
        self.with_element(el, |found, _| Some(found.text.clone()))
    }

    async fn attribute(
        &self,
        el: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, ActionError> {
        self.with_element(el, |found, _| found.attributes.get(name).cloned())
    }

    async fn is_attached(&self, el: &ElementRef) -> Result<bool, ActionError> {
        match self.with_element(el, |_, _| ()) {
            Ok(()) => Ok(true),
            Err(ActionError::Detached(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn bounding_box(&self, el: &ElementRef) -> Result<Option<Rect>, ActionError> {
        match self.with_element(el, |found, _| found.rect) {
            Ok(rect) => Ok(Some(rect)),
            Err(ActionError::Detached(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn activate(&self, el: &ElementRef) -> Result<(), ActionError> {
        self.click(el, ClickChannel::Dom)
    }

    async fn dispatch_events(&self, el: &ElementRef, names: &[&str]) -> Result<(), ActionError> {
        self.with_element(el, |found, events| {
            for name in names {
                events.push(PageEvent::Dispatched {
                    key: found.key.clone(),
                    event: (*name).to_string(),
                });
            }
        })?;
        if names.contains(&"click") {
            self.click(el, ClickChannel::Pointer)?;
        }
        Ok(())
    }

    async fn set_text(&self, el: &ElementRef, text: &str) -> Result<(), ActionError> {
        self.with_element(el, |found, events| {
            found.text = text.to_string();
            events.push(PageEvent::TextSet {
                key: found.key.clone(),
                text: text.to_string(),
            });
        })?;
        self.bump();
        Ok(())
    }

    async fn press_key(&self, el: &ElementRef, key: &str) -> Result<(), ActionError> {
        self.with_element(el, |found, events| {
            events.push(PageEvent::KeyPressed {
                key: found.key.clone(),
                name: key.to_string(),
            });
        })
    }

    async fn render_overlay(&self, id: &str, lines: &[String]) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.overlays.insert(id.to_string(), lines.to_vec());
        Ok(())
    }

    async fn remove_overlay(&self, id: &str) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.overlays.remove(id);
        Ok(())
    }
}

#[async_trait]
impl NativeInput for InMemoryPage {
    async fn native_click(&self, x: f64, y: f64) -> Result<(), ActionError> {
        let target = {
            let state = self.state.lock();
            Self::ensure_open(&state)?;
            state
                .elements
                .iter()
                .rposition(|el| el.attached && el.rect.contains(x, y))
        };
        match target {
            Some(index) => {
                let el = ElementRef {
                    id: index as u64,
                    selector: String::new(),
                };
                self.click(&el, ClickChannel::Native)
            }
            None => {
                self.state
                    .lock()
                    .events
                    .push(PageEvent::NativeClickMissed { x, y });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn first_matching_candidate_wins() {
        let page = InMemoryPage::new();
        page.insert(FakeElement::new("a").selector(".a"));
        page.insert(FakeElement::new("b").selector(".b"));
        let hit = page.query_first(&sel(&[".missing", ".b", ".a"])).await.unwrap();
        assert_eq!(hit.map(|el| el.selector), Some(".b".to_string()));
    }

    #[tokio::test]
    async fn detached_elements_do_not_match() {
        let page = InMemoryPage::new();
        page.insert(FakeElement::new("a").selector(".a"));
        page.detach("a");
        assert!(page.query_first(&sel(&[".a"])).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_mutation_times_out_with_current_seq() {
        let page = InMemoryPage::new();
        let seq = page.mutation_seq().await.unwrap();
        let after = page
            .wait_for_mutation(seq, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(after, seq);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_mutation_wakes_on_insert() {
        let page = InMemoryPage::new();
        let seq = page.mutation_seq().await.unwrap();
        let writer = page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.insert(FakeElement::new("late"));
        });
        let after = page
            .wait_for_mutation(seq, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(after > seq);
    }

    #[tokio::test]
    async fn native_click_hits_topmost_element() {
        let page = InMemoryPage::new();
        page.insert(FakeElement::new("under").rect(Rect::new(0.0, 0.0, 100.0, 100.0)));
        page.insert(
            FakeElement::new("over")
                .rect(Rect::new(10.0, 10.0, 20.0, 20.0))
                .on_click(ClickEffect::Detach),
        );
        page.native_click(15.0, 15.0).await.unwrap();
        assert_eq!(page.clicks_on("over"), vec![ClickChannel::Native]);
        assert!(!page.is_attached_key("over"));
    }

    #[tokio::test]
    async fn unresponsive_channel_records_but_has_no_effect() {
        let page = InMemoryPage::new();
        page.insert(
            FakeElement::new("mic")
                .selector(".mic")
                .attr("data-is-muted", "false")
                .on_click(ClickEffect::ToggleAttribute {
                    name: "data-is-muted".into(),
                })
                .responds_to(&[ClickChannel::Pointer]),
        );
        let el = page.query_first(&sel(&[".mic"])).await.unwrap().unwrap();
        page.activate(&el).await.unwrap();
        assert_eq!(page.attribute_of("mic", "data-is-muted").as_deref(), Some("false"));
        page.dispatch_events(&el, &crate::POINTER_SEQUENCE).await.unwrap();
        assert_eq!(page.attribute_of("mic", "data-is-muted").as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn closed_page_reports_gone() {
        let page = InMemoryPage::new();
        page.close();
        let err = page.query_first(&sel(&[".a"])).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn submitted_texts_pair_text_with_enter() {
        let page = InMemoryPage::new();
        page.insert(FakeElement::new("chat").selector("textarea"));
        let el = page.query_first(&sel(&["textarea"])).await.unwrap().unwrap();
        page.set_text(&el, "draft").await.unwrap();
        page.set_text(&el, "Hello").await.unwrap();
        page.press_key(&el, "Enter").await.unwrap();
        assert_eq!(page.submitted_texts("chat"), vec!["Hello".to_string()]);
    }
}
