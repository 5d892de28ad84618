//! Route and slug to page resolution.
//!
//! [`PageResolver`] finds the page behind an application route (creating it on
//! first access) or a CMS slug, and loads its block tree. [`RequestScope`]
//! memoizes the current page for one request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use folio_store::{NewPage, PageId, PageRecord, Store, StoreError, StoreErrorKind, TemplateId};
use tokio::sync::OnceCell;

use crate::block_tree::{OrphanPolicy, TreeError};
use crate::page::Page;
use crate::page_cache::{MemoryPageCache, PageCache};
use crate::position_editor::EditReport;
use crate::tree_loader::TreeLoader;

/// Route parameter carrying the slug on the reserved slug route.
pub const SLUG_PARAM: &str = "slug";

/// Error returned when a page cannot be resolved.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to load block tree: {0}")]
    Tree(#[from] TreeError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Resolver settings.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Template assigned to pages created for new routes.
    pub default_template: TemplateId,
    pub orphans: OrphanPolicy,
    /// Route name whose requests are resolved by slug.
    pub slug_route: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_template: TemplateId(1),
            orphans: OrphanPolicy::default(),
            slug_route: "page_slug".to_owned(),
        }
    }
}

/// Resolves pages and keeps them in an injected [`PageCache`].
pub struct PageResolver<'s, S: Store> {
    store: &'s S,
    cache: Box<dyn PageCache>,
    config: ResolverConfig,
}

impl<'s, S: Store> PageResolver<'s, S> {
    /// Create a resolver with an in-memory cache.
    #[must_use]
    pub fn new(store: &'s S, config: ResolverConfig) -> Self {
        Self {
            store,
            cache: Box::new(MemoryPageCache::new()),
            config,
        }
    }

    /// Replace the page cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Box<dyn PageCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Page attached to an application route, created on first access.
    ///
    /// A new page gets the default template (or none if it does not exist),
    /// is enabled, needs no login and is named after the route.
    pub async fn resolve_page_for_route(&self, route_name: &str) -> Result<Arc<Page>, ResolveError> {
        if let Some(page) = self.cache.get(route_name) {
            tracing::debug!(route = route_name, "Page cache hit");
            return Ok(page);
        }

        let record = match self.store.fetch_page_by_route(route_name).await? {
            Some(record) => record,
            None => self.create_route_page(route_name).await?,
        };

        let page = self.load(record).await?;
        self.cache.set(route_name, Arc::clone(&page));
        Ok(page)
    }

    /// CMS page by slug. Unknown slugs are `Ok(None)`, never created.
    pub async fn resolve_page_for_slug(&self, slug: &str) -> Result<Option<Arc<Page>>, ResolveError> {
        match self.store.fetch_page_by_slug(slug).await? {
            Some(record) => self.load(record).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop the cached page for a route.
    pub fn invalidate(&self, route_name: &str) {
        self.cache.invalidate(route_name);
    }

    /// Drop every cached entry of a page.
    pub fn invalidate_page(&self, page_id: PageId) {
        self.cache.invalidate_page(page_id);
    }

    /// Drop cached entries of every page an edit touched.
    pub fn apply_report(&self, report: &EditReport) {
        for &page in &report.pages {
            self.cache.invalidate_page(page);
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Start a request scope for a matched route.
    #[must_use]
    pub fn scope(&self, route: RouteMatch) -> RequestScope<'_, 's, S> {
        RequestScope::new(self, route)
    }

    async fn create_route_page(&self, route_name: &str) -> Result<PageRecord, StoreError> {
        let template = self.store.fetch_template(self.config.default_template).await?;
        if template.is_none() {
            tracing::warn!(
                template = %self.config.default_template,
                route = route_name,
                "Default template missing, creating page without template"
            );
        }

        let new_page = NewPage::for_route(route_name, template.map(|t| t.id), Utc::now());
        match self.store.create_page(&new_page).await {
            Ok(record) => {
                tracing::info!(route = route_name, page = %record.id, "Created page for route");
                Ok(record)
            }
            // Another caller created it between our read and write.
            Err(err) if err.kind == StoreErrorKind::AlreadyExists => self
                .store
                .fetch_page_by_route(route_name)
                .await?
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    async fn load(&self, record: PageRecord) -> Result<Arc<Page>, ResolveError> {
        let template = match record.template_id {
            Some(id) => self.store.fetch_template(id).await?,
            None => None,
        };

        let mut page = Page::new(record).with_template(template);
        TreeLoader::new(self.store)
            .with_orphan_policy(self.config.orphans)
            .load_tree(&mut page)
            .await?;
        Ok(Arc::new(page))
    }
}

/// Route matched for the current request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub route_name: String,
    pub params: HashMap<String, String>,
}

impl RouteMatch {
    #[must_use]
    pub fn new(route_name: impl Into<String>) -> Self {
        Self {
            route_name: route_name.into(),
            params: HashMap::new(),
        }
    }

    /// Match of the reserved slug route.
    #[must_use]
    pub fn slug(slug_route: impl Into<String>, slug: impl Into<String>) -> Self {
        Self::new(slug_route).with_param(SLUG_PARAM, slug)
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Per-request view of the resolver.
///
/// The current page is resolved at most once per scope; an absent page is
/// remembered as absent.
pub struct RequestScope<'r, 's, S: Store> {
    resolver: &'r PageResolver<'s, S>,
    route: RouteMatch,
    current: OnceCell<Option<Arc<Page>>>,
}

impl<'r, 's, S: Store> RequestScope<'r, 's, S> {
    fn new(resolver: &'r PageResolver<'s, S>, route: RouteMatch) -> Self {
        Self {
            resolver,
            route,
            current: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn route(&self) -> &RouteMatch {
        &self.route
    }

    /// Page of the current request.
    ///
    /// The reserved slug route resolves by its `slug` parameter; every other
    /// route resolves (and, if needed, creates) the page of that route.
    /// Errors are not memoized.
    pub async fn current_page(&self) -> Result<Option<Arc<Page>>, ResolveError> {
        self.current
            .get_or_try_init(|| self.resolve_current())
            .await
            .cloned()
    }

    async fn resolve_current(&self) -> Result<Option<Arc<Page>>, ResolveError> {
        if self.route.route_name != self.resolver.config.slug_route {
            let page = self.resolver.resolve_page_for_route(&self.route.route_name).await?;
            return Ok(Some(page));
        }

        let Some(slug) = self.route.param(SLUG_PARAM) else {
            tracing::error!(route = %self.route.route_name, "Slug route matched without a slug");
            return Ok(None);
        };

        let page = self.resolver.resolve_page_for_slug(slug).await?;
        if page.is_none() {
            tracing::error!(slug, "Page not found");
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use folio_store::{BlockId, MockStore};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::page_cache::NullPageCache;

    fn store() -> MockStore {
        MockStore::new()
            .with_template(1, "default", "templates/default.html")
            .with_route_page(1, "homepage")
            .with_slug_page(2, "about-us")
            .with_block(2, 1, None, 1, "core.container")
            .with_block(3, 1, Some(2), 1, "core.text")
            .with_block(4, 1, Some(2), 2, "core.text")
            .with_block(5, 2, None, 1, "core.text")
    }

    #[tokio::test]
    async fn test_resolve_existing_route_loads_tree() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let page = resolver.resolve_page_for_route("homepage").await.unwrap();

        assert_eq!(page.id(), PageId(1));
        let tree = page.tree.as_ref().unwrap();
        assert_eq!(tree.child_ids(BlockId(2)), vec![BlockId(3), BlockId(4)]);
        assert_eq!(store.page_count(), 2);
    }

    #[tokio::test]
    async fn test_resolve_unknown_route_creates_page() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let page = resolver.resolve_page_for_route("contact").await.unwrap();

        assert_eq!(store.page_count(), 3);
        assert_eq!(page.record.name, "contact");
        assert_eq!(page.record.route_name.as_deref(), Some("contact"));
        assert_eq!(page.record.template_id, Some(TemplateId(1)));
        assert!(page.record.enabled);
        assert!(!page.record.login_required);
        assert_eq!(page.template.as_ref().map(|t| t.name.as_str()), Some("default"));
        assert!(page.tree.as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_created_page_without_default_template() {
        let store = MockStore::new();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let page = resolver.resolve_page_for_route("contact").await.unwrap();

        assert_eq!(page.record.template_id, None);
        assert!(page.template.is_none());
    }

    #[tokio::test]
    async fn test_route_cache_hit_skips_store() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let first = resolver.resolve_page_for_route("homepage").await.unwrap();
        let second = resolver.resolve_page_for_route("homepage").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.route_queries(), 1);
        assert_eq!(store.block_queries(), 1);
    }

    #[tokio::test]
    async fn test_null_cache_queries_every_time() {
        let store = store();
        let resolver =
            PageResolver::new(&store, ResolverConfig::default()).with_cache(Box::new(NullPageCache));

        resolver.resolve_page_for_route("homepage").await.unwrap();
        resolver.resolve_page_for_route("homepage").await.unwrap();

        assert_eq!(store.route_queries(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        resolver.resolve_page_for_route("homepage").await.unwrap();
        resolver.invalidate("homepage");
        resolver.resolve_page_for_route("homepage").await.unwrap();

        assert_eq!(store.route_queries(), 2);
    }

    #[tokio::test]
    async fn test_apply_report_invalidates_touched_pages() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());
        resolver.resolve_page_for_route("homepage").await.unwrap();

        resolver.apply_report(&EditReport {
            updated: 1,
            pages: [PageId(1)].into(),
            anchors: vec![BlockId(2)],
        });
        resolver.resolve_page_for_route("homepage").await.unwrap();

        assert_eq!(store.route_queries(), 2);
    }

    #[tokio::test]
    async fn test_resolve_slug_found() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let page = resolver.resolve_page_for_slug("about-us").await.unwrap().unwrap();

        assert_eq!(page.id(), PageId(2));
        assert_eq!(page.tree.as_ref().unwrap().root_ids(), vec![BlockId(5)]);
    }

    #[tokio::test]
    async fn test_resolve_unknown_slug_is_none() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let page = resolver.resolve_page_for_slug("missing").await.unwrap();

        assert!(page.is_none());
        assert_eq!(store.page_count(), 2);
    }

    #[tokio::test]
    async fn test_resolve_propagates_tree_error() {
        let store = MockStore::new()
            .with_route_page(1, "broken")
            .with_block(3, 1, Some(42), 1, "core.text");
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let err = resolver.resolve_page_for_route("broken").await.unwrap_err();

        assert!(matches!(err, ResolveError::Tree(TreeError::OrphanedBlock { .. })));
    }

    #[tokio::test]
    async fn test_current_page_by_slug_memoized() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());
        let scope = resolver.scope(RouteMatch::slug("page_slug", "about-us"));

        let first = scope.current_page().await.unwrap().unwrap();
        let second = scope.current_page().await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.slug_queries(), 1);
        assert_eq!(store.route_queries(), 0);
    }

    #[tokio::test]
    async fn test_current_page_absent_memoized() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());
        let scope = resolver.scope(RouteMatch::slug("page_slug", "missing"));

        assert!(scope.current_page().await.unwrap().is_none());
        assert!(scope.current_page().await.unwrap().is_none());

        assert_eq!(store.slug_queries(), 1);
    }

    #[tokio::test]
    async fn test_current_page_by_route() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());
        let scope = resolver.scope(RouteMatch::new("homepage"));

        let page = scope.current_page().await.unwrap().unwrap();

        assert_eq!(page.id(), PageId(1));
        assert_eq!(store.slug_queries(), 0);
    }

    #[tokio::test]
    async fn test_current_page_custom_slug_route() {
        let store = store();
        let config = ResolverConfig {
            slug_route: "cms".to_owned(),
            ..ResolverConfig::default()
        };
        let resolver = PageResolver::new(&store, config);

        let page = resolver
            .scope(RouteMatch::slug("cms", "about-us"))
            .current_page()
            .await
            .unwrap();

        assert_eq!(page.map(|p| p.id()), Some(PageId(2)));
    }

    #[tokio::test]
    async fn test_current_page_slug_route_without_param() {
        let store = store();
        let resolver = PageResolver::new(&store, ResolverConfig::default());

        let page = resolver
            .scope(RouteMatch::new("page_slug"))
            .current_page()
            .await
            .unwrap();

        assert!(page.is_none());
        assert_eq!(store.slug_queries(), 0);
    }
}
