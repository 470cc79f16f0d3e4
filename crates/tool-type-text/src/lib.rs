//! Text submission: replace the field's text, fire `input`, then press the commit
//! key. There is no read-back; a submission that the page silently drops still
//! reports success.

pub mod errors;
pub mod policy;

use action_primitives::{DomPort, ElementRef};
use tracing::{debug, instrument};

pub use errors::TypeTextError;
pub use policy::TypePolicy;

#[derive(Clone, Debug, Default)]
pub struct TextSubmitter {
    policy: TypePolicy,
}

impl TextSubmitter {
    pub fn new(policy: TypePolicy) -> Self {
        Self { policy }
    }

    #[instrument(skip_all, fields(element = %el, len = text.chars().count()))]
    pub async fn submit(
        &self,
        dom: &dyn DomPort,
        el: &ElementRef,
        text: &str,
    ) -> Result<(), TypeTextError> {
        let len = text.chars().count();
        if text.trim().is_empty() {
            return Err(TypeTextError::Empty);
        }
        if len > self.policy.max_text_len {
            return Err(TypeTextError::TextTooLong(self.policy.max_text_len));
        }
        dom.set_text(el, text).await?;
        dom.press_key(el, &self.policy.commit_key).await?;
        debug!("text submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{FakeElement, InMemoryPage};

    async fn chat_input(page: &InMemoryPage) -> ElementRef {
        page.insert(FakeElement::new("chat").selector("textarea"));
        page.query_first(&["textarea".to_string()])
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn submits_text_then_commit_key() {
        let page = InMemoryPage::new();
        let el = chat_input(&page).await;
        TextSubmitter::default()
            .submit(&page, &el, "Hello")
            .await
            .unwrap();
        assert_eq!(page.submitted_texts("chat"), vec!["Hello".to_string()]);
    }

    #[tokio::test]
    async fn rejects_blank_and_oversized_text() {
        let page = InMemoryPage::new();
        let el = chat_input(&page).await;
        let submitter = TextSubmitter::new(TypePolicy {
            max_text_len: 3,
            ..TypePolicy::default()
        });
        assert!(matches!(
            submitter.submit(&page, &el, "   ").await,
            Err(TypeTextError::Empty)
        ));
        assert!(matches!(
            submitter.submit(&page, &el, "Goodbye").await,
            Err(TypeTextError::TextTooLong(3))
        ));
        assert!(page.submitted_texts("chat").is_empty());
    }

    #[tokio::test]
    async fn detached_input_surfaces_dom_error() {
        let page = InMemoryPage::new();
        let el = chat_input(&page).await;
        page.detach("chat");
        let err = TextSubmitter::default()
            .submit(&page, &el, "Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, TypeTextError::Dom(_)));
    }
}
