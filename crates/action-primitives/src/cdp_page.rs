//! [`DomPort`] implemented by evaluating small scripts through the CDP adapter.
//!
//! Every expression is prefixed with an idempotent bootstrap that installs
//! `window.__callwarden`: a node reference table plus a document-wide
//! `MutationObserver` that bumps a sequence counter and wakes pending waiters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use callwarden_core_types::PageId;
use cdp_adapter::Cdp;

use crate::errors::ActionError;
use crate::ports::{DomPort, NativeInput};
use crate::types::{ElementRef, Rect};

const BOOTSTRAP: &str = r#"(() => {
  if (window.__callwarden && window.__callwarden.doc === document) return;
  const st = { doc: document, refs: new Map(), next: 1, seq: 0, waiters: [] };
  new MutationObserver(() => {
    st.seq += 1;
    const pending = st.waiters;
    st.waiters = [];
    pending.forEach((wake) => wake(st.seq));
  }).observe(document, { subtree: true, childList: true, attributes: true, characterData: true });
  st.query = (selectors) => {
    for (const [id, known] of st.refs) {
      if (!known.isConnected) st.refs.delete(id);
    }
    for (const sel of selectors) {
      let el = null;
      try { el = document.querySelector(sel); } catch (_) { continue; }
      if (!el) continue;
      for (const [id, known] of st.refs) {
        if (known === el) return { id, selector: sel };
      }
      const id = st.next++;
      st.refs.set(id, el);
      return { id, selector: sel };
    }
    return null;
  };
  st.el = (id) => {
    const el = st.refs.get(id);
    return el && el.isConnected ? el : null;
  };
  st.wait = (after, ms) => new Promise((resolve) => {
    if (st.seq > after) { resolve(st.seq); return; }
    const timer = setTimeout(() => resolve(st.seq), ms);
    st.waiters.push((seq) => { clearTimeout(timer); resolve(seq); });
  });
  window.__callwarden = st;
})();"#;

/// Page handle backed by a live browser tab.
#[derive(Clone)]
pub struct CdpPage {
    cdp: Arc<dyn Cdp>,
    page: PageId,
}

impl CdpPage {
    pub fn new(cdp: Arc<dyn Cdp>, page: PageId) -> Self {
        Self { cdp, page }
    }

    pub fn page_id(&self) -> &PageId {
        &self.page
    }

    async fn eval(&self, body: &str) -> Result<Value, ActionError> {
        let expression = format!("{BOOTSTRAP}\n{body}");
        trace!(page = %self.page, body, "evaluating");
        Ok(self.cdp.evaluate_script(&self.page, &expression).await?)
    }

    async fn eval_as<T: DeserializeOwned>(&self, body: &str) -> Result<T, ActionError> {
        let value = self.eval(body).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Runs `body` with `el` bound to the referenced node; `null` when detached.
    fn with_element(el: &ElementRef, body: &str) -> String {
        format!(
            "(() => {{ const el = window.__callwarden.el({}); if (!el) return {{ detached: true }}; {} }})()",
            el.id, body
        )
    }

    async fn element_call(&self, el: &ElementRef, body: &str) -> Result<Value, ActionError> {
        let value = self.eval(&Self::with_element(el, body)).await?;
        if value.get("detached").and_then(Value::as_bool) == Some(true) {
            return Err(ActionError::Detached(el.to_string()));
        }
        Ok(value)
    }
}

fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

#[async_trait]
impl DomPort for CdpPage {
    async fn query_first(&self, selectors: &[String]) -> Result<Option<ElementRef>, ActionError> {
        let list = serde_json::to_string(selectors)?;
        self.eval_as(&format!("window.__callwarden.query({list})"))
            .await
    }

    async fn mutation_seq(&self) -> Result<u64, ActionError> {
        self.eval_as("window.__callwarden.seq").await
    }

    async fn wait_for_mutation(
        &self,
        after: u64,
        timeout: Duration,
    ) -> Result<u64, ActionError> {
        let ms = timeout.as_millis().min(u32::MAX as u128);
        self.eval_as(&format!("window.__callwarden.wait({after}, {ms})"))
            .await
    }

    async fn text_content(&self, el: &ElementRef) -> Result<Option<String>, ActionError> {
        let value = self
            .element_call(
                el,
                "return { text: (el.innerText || el.textContent || '').trim() };",
            )
            .await?;
        Ok(value
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn attribute(
        &self,
        el: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, ActionError> {
        let value = self
            .element_call(
                el,
                &format!("return {{ value: el.getAttribute({}) }};", js_string(name)),
            )
            .await?;
        Ok(value
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn is_attached(&self, el: &ElementRef) -> Result<bool, ActionError> {
        match self.element_call(el, "return { detached: false };").await {
            Ok(_) => Ok(true),
            Err(ActionError::Detached(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn bounding_box(&self, el: &ElementRef) -> Result<Option<Rect>, ActionError> {
        let body = "const r = el.getBoundingClientRect(); \
                    return { x: r.left, y: r.top, width: r.width, height: r.height };";
        match self.element_call(el, body).await {
            Ok(value) => Ok(Some(serde_json::from_value(value)?)),
            Err(ActionError::Detached(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn activate(&self, el: &ElementRef) -> Result<(), ActionError> {
        self.element_call(el, "el.click(); return { ok: true };")
            .await
            .map(|_| ())
    }

    async fn dispatch_events(&self, el: &ElementRef, events: &[&str]) -> Result<(), ActionError> {
        let names = serde_json::to_string(events)?;
        let body = format!(
            "const r = el.getBoundingClientRect(); \
             const init = {{ bubbles: true, cancelable: true, view: window, \
               clientX: r.left + r.width / 2, clientY: r.top + r.height / 2, button: 0 }}; \
             for (const name of {names}) {{ \
               const ev = name.startsWith('pointer') ? new PointerEvent(name, init) : new MouseEvent(name, init); \
               el.dispatchEvent(ev); \
             }} \
             return {{ ok: true }};"
        );
        self.element_call(el, &body).await.map(|_| ())
    }

    async fn set_text(&self, el: &ElementRef, text: &str) -> Result<(), ActionError> {
        let body = format!(
            "el.focus(); \
             const text = {}; \
             if (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement) {{ \
               const proto = Object.getPrototypeOf(el); \
               const setter = Object.getOwnPropertyDescriptor(proto, 'value').set; \
               setter.call(el, text); \
             }} else {{ el.textContent = text; }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             return {{ ok: true }};",
            js_string(text)
        );
        self.element_call(el, &body).await.map(|_| ())
    }

    async fn press_key(&self, el: &ElementRef, key: &str) -> Result<(), ActionError> {
        let body = format!(
            "const init = {{ key: {k}, code: {k}, keyCode: {k} === 'Enter' ? 13 : 0, \
               which: {k} === 'Enter' ? 13 : 0, bubbles: true, cancelable: true }}; \
             for (const type of ['keydown', 'keypress', 'keyup']) {{ \
               el.dispatchEvent(new KeyboardEvent(type, init)); \
             }} \
             return {{ ok: true }};",
            k = js_string(key)
        );
        self.element_call(el, &body).await.map(|_| ())
    }

    async fn render_overlay(&self, id: &str, lines: &[String]) -> Result<(), ActionError> {
        let dom_id = js_string(&format!("callwarden-overlay-{id}"));
        let text = js_string(&lines.join("\n"));
        let body = format!(
            "(() => {{ \
               let box = document.getElementById({dom_id}); \
               if (!box) {{ \
                 box = document.createElement('div'); \
                 box.id = {dom_id}; \
                 const offset = document.querySelectorAll('[id^=\"callwarden-overlay-\"]').length * 120; \
                 box.style.cssText = 'position:fixed;right:12px;z-index:2147483647;' + \
                   'background:rgba(0,0,0,.75);color:#fff;font:12px monospace;' + \
                   'padding:6px 8px;border-radius:4px;white-space:pre-wrap;max-width:360px;' + \
                   'pointer-events:none;top:' + (12 + offset) + 'px'; \
                 document.body.appendChild(box); \
               }} \
               box.textContent = {text}; \
               return true; \
             }})()"
        );
        self.eval(&body).await.map(|_| ())
    }

    async fn remove_overlay(&self, id: &str) -> Result<(), ActionError> {
        let dom_id = js_string(&format!("callwarden-overlay-{id}"));
        self.eval(&format!(
            "(() => {{ const box = document.getElementById({dom_id}); if (box) box.remove(); return true; }})()"
        ))
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl NativeInput for CdpPage {
    async fn native_click(&self, x: f64, y: f64) -> Result<(), ActionError> {
        Ok(self.cdp.dispatch_click(&self.page, x, y).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_wrapper_binds_reference() {
        let el = ElementRef {
            id: 7,
            selector: "button".into(),
        };
        let script = CdpPage::with_element(&el, "return { ok: true };");
        assert!(script.contains("window.__callwarden.el(7)"));
        assert!(script.contains("detached: true"));
    }

    #[test]
    fn query_drops_detached_references_before_reuse() {
        let query = &BOOTSTRAP[BOOTSTRAP.find("st.query").unwrap()..];
        let prune = query.find("if (!known.isConnected) st.refs.delete(id);").unwrap();
        let reuse = query.find("if (known === el)").unwrap();
        let assign = query.find("st.refs.set(id, el)").unwrap();
        assert!(prune < reuse && reuse < assign);
        // Ids only move forward, so a pruned id never points at a new node.
        assert_eq!(BOOTSTRAP.matches("st.next++").count(), 1);
    }

    #[test]
    fn js_strings_are_escaped() {
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }
}
