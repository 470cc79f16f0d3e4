//! Role resolution with an immediate pass and mutation-driven deferred passes.

use std::sync::Arc;
use std::time::Duration;

use action_primitives::{DomPort, ElementRef};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::errors::LocatorError;
use crate::roles::{LocatorRole, RoleMap};

pub const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves [`LocatorRole`]s to live elements on one page.
#[derive(Clone)]
pub struct ElementLocator {
    dom: Arc<dyn DomPort>,
    roles: Arc<RoleMap>,
    default_timeout: Duration,
}

impl ElementLocator {
    pub fn new(dom: Arc<dyn DomPort>, roles: Arc<RoleMap>) -> Self {
        Self {
            dom,
            roles,
            default_timeout: DEFAULT_LOCATE_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn roles(&self) -> &RoleMap {
        &self.roles
    }

    /// First element matching the role's candidates, or `None` once `timeout`
    /// (default 10 s) passes without a match.
    pub async fn locate(
        &self,
        role: LocatorRole,
        timeout: Option<Duration>,
    ) -> Result<Option<ElementRef>, LocatorError> {
        self.resolve(role, None, timeout).await
    }

    /// Like [`locate`](Self::locate), but a candidate only counts when its visible text
    /// (or `aria-label`) contains one of `labels`. Candidates are tried one by one so a
    /// generic selector matching the wrong control does not hide a later one.
    pub async fn locate_labeled(
        &self,
        role: LocatorRole,
        labels: &[String],
        timeout: Option<Duration>,
    ) -> Result<Option<ElementRef>, LocatorError> {
        self.resolve(role, Some(labels), timeout).await
    }

    #[instrument(skip(self, labels), fields(role = %role))]
    async fn resolve(
        &self,
        role: LocatorRole,
        labels: Option<&[String]>,
        timeout: Option<Duration>,
    ) -> Result<Option<ElementRef>, LocatorError> {
        let candidates = self.roles.candidates(role);
        if candidates.is_empty() {
            return Ok(None);
        }
        let timeout = timeout.unwrap_or(self.default_timeout);
        let deadline = Instant::now() + timeout;
        let mut passes = 0u32;

        loop {
            // Sample before testing so a mutation landing mid-pass still wakes us.
            let seq = self.dom.mutation_seq().await?;
            passes += 1;
            if let Some(found) = self.pass(candidates, labels).await? {
                debug!(passes, element = %found, "role located");
                return Ok(Some(found));
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(passes, ?timeout, "role not found");
                return Ok(None);
            }
            self.dom.wait_for_mutation(seq, deadline - now).await?;
        }
    }

    async fn pass(
        &self,
        candidates: &[String],
        labels: Option<&[String]>,
    ) -> Result<Option<ElementRef>, LocatorError> {
        let Some(labels) = labels else {
            return Ok(self.dom.query_first(candidates).await?);
        };
        for candidate in candidates {
            let Some(el) = self
                .dom
                .query_first(std::slice::from_ref(candidate))
                .await?
            else {
                continue;
            };
            if self.has_label(&el, labels).await? {
                return Ok(Some(el));
            }
            debug!(element = %el, "candidate label does not match");
        }
        Ok(None)
    }

    async fn has_label(&self, el: &ElementRef, labels: &[String]) -> Result<bool, LocatorError> {
        let matches = |text: &str| {
            let text = text.to_lowercase();
            labels
                .iter()
                .filter(|label| !label.trim().is_empty())
                .any(|label| text.contains(&label.to_lowercase()))
        };
        if let Some(text) = self.dom.text_content(el).await? {
            if matches(&text) {
                return Ok(true);
            }
        }
        Ok(self
            .dom
            .attribute(el, "aria-label")
            .await?
            .map(|label| matches(&label))
            .unwrap_or(false))
    }
}
