//! Adapter registry keeping track of the pages the adapter opened.

use dashmap::DashMap;

use callwarden_core_types::PageId;

/// Concurrent registry of live page handles keyed by [`PageId`].
pub struct Registry<H> {
    pages: DashMap<PageId, H>,
}

impl<H: Clone> Registry<H> {
    pub fn new() -> Self {
        Self {
            pages: DashMap::new(),
        }
    }

    pub fn insert_page(&self, page: PageId, handle: H) {
        self.pages.insert(page, handle);
    }

    pub fn remove_page(&self, page: &PageId) -> Option<H> {
        self.pages.remove(page).map(|(_, handle)| handle)
    }

    pub fn handle(&self, page: &PageId) -> Option<H> {
        self.pages.get(page).map(|entry| entry.value().clone())
    }

    pub fn drain(&self) -> Vec<(PageId, H)> {
        let ids: Vec<PageId> = self.pages.iter().map(|kv| kv.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.remove_page(&id).map(|handle| (id, handle)))
            .collect()
    }
}

impl<H: Clone> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_page_has_no_handle() {
        let registry: Registry<u32> = Registry::new();
        let page = PageId::new();
        registry.insert_page(page.clone(), 7);
        assert_eq!(registry.handle(&page), Some(7));
        assert_eq!(registry.remove_page(&page), Some(7));
        assert!(registry.handle(&page).is_none());
        assert!(registry.remove_page(&page).is_none());
    }

    #[test]
    fn drain_empties_registry() {
        let registry: Registry<&'static str> = Registry::new();
        registry.insert_page(PageId::new(), "a");
        registry.insert_page(PageId::new(), "b");
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.drain().is_empty());
    }
}
