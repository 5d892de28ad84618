//! Page caching infrastructure.
//!
//! Provides a trait for caching resolved pages and implementations:
//! - [`PageCache`]: Trait for cache implementations
//! - [`NullPageCache`]: No-op cache (disabled caching)
//! - [`MemoryPageCache`]: Process-local cache keyed by route name

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use folio_store::PageId;

use crate::page::Page;

/// Trait for page caching implementations.
///
/// Entries are keyed by route name and hold pages with their tree loaded.
pub trait PageCache: Send + Sync {
    /// Cached page for a route, if any.
    fn get(&self, route_name: &str) -> Option<Arc<Page>>;

    /// Store a resolved page.
    fn set(&self, route_name: &str, page: Arc<Page>);

    /// Remove the entry for a route name.
    fn invalidate(&self, route_name: &str);

    /// Remove every entry holding the given page.
    fn invalidate_page(&self, page_id: PageId);

    /// Remove all entries.
    fn clear(&self);
}

/// No-op cache implementation.
///
/// Always returns cache misses and discards stored pages.
#[derive(Debug, Default)]
pub struct NullPageCache;

impl PageCache for NullPageCache {
    fn get(&self, _route_name: &str) -> Option<Arc<Page>> {
        None
    }

    fn set(&self, _route_name: &str, _page: Arc<Page>) {}

    fn invalidate(&self, _route_name: &str) {}

    fn invalidate_page(&self, _page_id: PageId) {}

    fn clear(&self) {}
}

/// In-memory page cache.
///
/// Lives as long as its owner; there is no expiry. Edits must be followed by
/// [`PageCache::invalidate_page`] for each touched page.
#[derive(Debug, Default)]
pub struct MemoryPageCache {
    pages: RwLock<HashMap<String, Arc<Page>>>,
}

impl MemoryPageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached routes.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageCache for MemoryPageCache {
    fn get(&self, route_name: &str) -> Option<Arc<Page>> {
        self.pages.read().unwrap().get(route_name).cloned()
    }

    fn set(&self, route_name: &str, page: Arc<Page>) {
        self.pages
            .write()
            .unwrap()
            .insert(route_name.to_owned(), page);
    }

    fn invalidate(&self, route_name: &str) {
        self.pages.write().unwrap().remove(route_name);
    }

    fn invalidate_page(&self, page_id: PageId) {
        self.pages
            .write()
            .unwrap()
            .retain(|_, page| page.id() != page_id);
    }

    fn clear(&self) {
        self.pages.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use folio_store::PageRecord;

    use super::*;

    fn page(id: i64, route: &str) -> Arc<Page> {
        let now = Utc::now();
        Arc::new(Page::new(PageRecord {
            id: PageId(id),
            name: route.to_owned(),
            route_name: Some(route.to_owned()),
            slug: None,
            template_id: None,
            enabled: true,
            login_required: false,
            created_at: now,
            updated_at: now,
        }))
    }

    #[test]
    fn test_null_cache_never_hits() {
        let cache = NullPageCache;

        cache.set("homepage", page(1, "homepage"));

        assert!(cache.get("homepage").is_none());
    }

    #[test]
    fn test_memory_cache_returns_same_page() {
        let cache = MemoryPageCache::new();
        let stored = page(1, "homepage");

        cache.set("homepage", Arc::clone(&stored));

        let hit = cache.get("homepage").unwrap();
        assert!(Arc::ptr_eq(&hit, &stored));
        assert!(cache.get("contact").is_none());
    }

    #[test]
    fn test_memory_cache_invalidate_route() {
        let cache = MemoryPageCache::new();
        cache.set("homepage", page(1, "homepage"));
        cache.set("contact", page(2, "contact"));

        cache.invalidate("homepage");

        assert!(cache.get("homepage").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_memory_cache_invalidate_page() {
        let cache = MemoryPageCache::new();
        cache.set("homepage", page(1, "homepage"));
        cache.set("contact", page(2, "contact"));

        cache.invalidate_page(PageId(2));

        assert!(cache.get("contact").is_none());
        assert!(cache.get("homepage").is_some());
    }

    #[test]
    fn test_memory_cache_clear() {
        let cache = MemoryPageCache::new();
        cache.set("homepage", page(1, "homepage"));

        cache.clear();

        assert!(cache.is_empty());
    }

    static_assertions::assert_impl_all!(MemoryPageCache: PageCache, Send, Sync);
}
