//! Mock store implementation for testing.
//!
//! Provides [`MockStore`] for unit testing without a database.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{TimeZone, Utc};

use crate::record::{
    BlockId, BlockLocation, BlockPlacement, BlockRecord, NewBlock, NewPage, NewTemplate, PageId,
    PageRecord, Template, TemplateId,
};
use crate::store::{Store, StoreError, StoreErrorKind, StoreTransaction};

/// Backend identifier for error messages.
const BACKEND: &str = "Mock";

#[derive(Clone, Debug, Default)]
struct MockState {
    templates: BTreeMap<TemplateId, Template>,
    pages: BTreeMap<PageId, PageRecord>,
    blocks: BTreeMap<BlockId, BlockRecord>,
}

/// Mock store for testing.
///
/// Keeps templates, pages and blocks in memory. Use the builder methods to
/// configure the mock with test data. Transactions work on a private copy of
/// the blocks and on commit write back only the rows they updated, so for a
/// row touched by two transactions the last commit wins.
///
/// Placement updates can be made to fail for chosen blocks with
/// [`MockStore::failing_placement`], and query counters let tests check how
/// often the store was hit.
///
/// # Example
///
/// ```ignore
/// use folio_store::{MockStore, PageId, Store};
///
/// let store = MockStore::new()
///     .with_route_page(1, "homepage")
///     .with_block(2, 1, None, 1, "core.container")
///     .with_block(3, 1, Some(2), 1, "core.text");
///
/// let blocks = store.fetch_blocks(PageId(1)).await.unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MockStore {
    state: Mutex<MockState>,
    failing_placements: RwLock<HashSet<BlockId>>,
    route_queries: AtomicUsize,
    slug_queries: AtomicUsize,
    block_queries: AtomicUsize,
    placement_attempts: AtomicUsize,
}

/// Fixed timestamp for seeded pages so tests compare deterministically.
fn seeded_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl MockStore {
    /// Create a new empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_template(self, id: i64, name: &str, path: &str) -> Self {
        self.state.lock().unwrap().templates.insert(
            TemplateId(id),
            Template {
                id: TemplateId(id),
                name: name.to_owned(),
                path: path.to_owned(),
            },
        );
        self
    }

    /// Add a page attached to an application route.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_route_page(self, id: i64, route_name: &str) -> Self {
        self.insert_page(id, Some(route_name), None);
        self
    }

    /// Add a CMS page addressed by slug.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_slug_page(self, id: i64, slug: &str) -> Self {
        self.insert_page(id, None, Some(slug));
        self
    }

    fn insert_page(&self, id: i64, route_name: Option<&str>, slug: Option<&str>) {
        let now = seeded_at();
        self.state.lock().unwrap().pages.insert(
            PageId(id),
            PageRecord {
                id: PageId(id),
                name: route_name.or(slug).unwrap_or_default().to_owned(),
                route_name: route_name.map(str::to_owned),
                slug: slug.map(str::to_owned),
                template_id: None,
                enabled: true,
                login_required: false,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Add a block.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_block(
        self,
        id: i64,
        page_id: i64,
        parent_id: Option<i64>,
        position: u32,
        block_type: &str,
    ) -> Self {
        self.state.lock().unwrap().blocks.insert(
            BlockId(id),
            BlockRecord {
                id: BlockId(id),
                page_id: PageId(page_id),
                parent_id: parent_id.map(BlockId),
                position,
                block_type: block_type.to_owned(),
                name: None,
                settings: serde_json::Value::Object(serde_json::Map::new()),
            },
        );
        self
    }

    /// Add a block with renderer settings.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_block_settings(self, id: i64, settings: serde_json::Value) -> Self {
        if let Some(block) = self.state.lock().unwrap().blocks.get_mut(&BlockId(id)) {
            block.settings = settings;
        }
        self
    }

    /// Make placement updates of `block_id` fail with an `Unavailable` error.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn failing_placement(self, block_id: i64) -> Self {
        self.fail_placement(BlockId(block_id));
        self
    }

    /// Make placement updates of `block_id` fail from now on.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fail_placement(&self, block_id: BlockId) {
        self.failing_placements.write().unwrap().insert(block_id);
    }

    /// Committed state of a block.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn block(&self, id: i64) -> Option<BlockRecord> {
        self.state.lock().unwrap().blocks.get(&BlockId(id)).cloned()
    }

    /// Committed state of every block, ascending by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn blocks(&self) -> Vec<BlockRecord> {
        self.state.lock().unwrap().blocks.values().cloned().collect()
    }

    /// Number of pages currently stored.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.lock().unwrap().pages.len()
    }

    /// Number of `fetch_page_by_route` calls so far.
    #[must_use]
    pub fn route_queries(&self) -> usize {
        self.route_queries.load(Ordering::Relaxed)
    }

    /// Number of `fetch_page_by_slug` calls so far.
    #[must_use]
    pub fn slug_queries(&self) -> usize {
        self.slug_queries.load(Ordering::Relaxed)
    }

    /// Number of `fetch_blocks` calls so far.
    #[must_use]
    pub fn block_queries(&self) -> usize {
        self.block_queries.load(Ordering::Relaxed)
    }

    /// Number of placement updates attempted so far, failed ones included.
    #[must_use]
    pub fn placement_attempts(&self) -> usize {
        self.placement_attempts.load(Ordering::Relaxed)
    }
}

fn sorted_siblings<'a>(
    blocks: impl Iterator<Item = &'a BlockRecord>,
    page_id: PageId,
    parent_id: Option<BlockId>,
) -> Vec<(BlockId, u32)> {
    let mut siblings: Vec<(BlockId, u32)> = blocks
        .filter(|b| b.page_id == page_id && b.parent_id == parent_id)
        .map(|b| (b.id, b.position))
        .collect();
    siblings.sort_by_key(|&(id, position)| (position, id));
    siblings
}

impl Store for MockStore {
    type Transaction<'a> = MockTransaction<'a>;

    async fn fetch_blocks(&self, page_id: PageId) -> Result<Vec<BlockRecord>, StoreError> {
        self.block_queries.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().unwrap();
        let mut blocks: Vec<BlockRecord> = state
            .blocks
            .values()
            .filter(|b| b.page_id == page_id)
            .cloned()
            .collect();
        blocks.sort_by_key(|b| (b.position, b.id));
        Ok(blocks)
    }

    async fn fetch_page_by_route(&self, route_name: &str) -> Result<Option<PageRecord>, StoreError> {
        self.route_queries.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .values()
            .find(|p| p.route_name.as_deref() == Some(route_name))
            .cloned())
    }

    async fn fetch_page_by_slug(&self, slug: &str) -> Result<Option<PageRecord>, StoreError> {
        self.slug_queries.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .values()
            .find(|p| p.slug.as_deref() == Some(slug))
            .cloned())
    }

    async fn fetch_template(&self, id: TemplateId) -> Result<Option<Template>, StoreError> {
        Ok(self.state.lock().unwrap().templates.get(&id).cloned())
    }

    async fn create_page(&self, page: &NewPage) -> Result<PageRecord, StoreError> {
        let mut state = self.state.lock().unwrap();
        let taken = state.pages.values().any(|p| {
            (page.route_name.is_some() && p.route_name == page.route_name)
                || (page.slug.is_some() && p.slug == page.slug)
        });
        if taken {
            return Err(StoreError::new(StoreErrorKind::AlreadyExists)
                .with_context(format!("page {}", page.name))
                .with_backend(BACKEND));
        }

        let id = PageId(state.pages.keys().last().map_or(1, |last| last.0 + 1));
        let record = PageRecord {
            id,
            name: page.name.clone(),
            route_name: page.route_name.clone(),
            slug: page.slug.clone(),
            template_id: page.template_id,
            enabled: page.enabled,
            login_required: page.login_required,
            created_at: page.created_at,
            updated_at: page.updated_at,
        };
        state.pages.insert(id, record.clone());
        Ok(record)
    }

    async fn create_template(&self, template: &NewTemplate) -> Result<Template, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = TemplateId(state.templates.keys().last().map_or(1, |last| last.0 + 1));
        let record = Template {
            id,
            name: template.name.clone(),
            path: template.path.clone(),
        };
        state.templates.insert(id, record.clone());
        Ok(record)
    }

    async fn create_block(&self, block: &NewBlock) -> Result<BlockRecord, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = BlockId(state.blocks.keys().last().map_or(1, |last| last.0 + 1));
        let record = BlockRecord {
            id,
            page_id: block.page_id,
            parent_id: block.parent_id,
            position: block.position,
            block_type: block.block_type.clone(),
            name: block.name.clone(),
            settings: block.settings.clone(),
        };
        state.blocks.insert(id, record.clone());
        Ok(record)
    }

    async fn begin(&self) -> Result<MockTransaction<'_>, StoreError> {
        let blocks = self.state.lock().unwrap().blocks.clone();
        Ok(MockTransaction {
            store: self,
            blocks,
            touched: BTreeSet::new(),
        })
    }
}

/// Transaction over a private copy of the mock's blocks.
#[derive(Debug)]
pub struct MockTransaction<'a> {
    store: &'a MockStore,
    blocks: BTreeMap<BlockId, BlockRecord>,
    touched: BTreeSet<BlockId>,
}

impl StoreTransaction for MockTransaction<'_> {
    async fn block_location(&mut self, block_id: BlockId) -> Result<Option<BlockLocation>, StoreError> {
        Ok(self.blocks.get(&block_id).map(|b| BlockLocation {
            page_id: b.page_id,
            parent_id: b.parent_id,
        }))
    }

    async fn update_block_placement(&mut self, placement: &BlockPlacement) -> Result<(), StoreError> {
        self.store.placement_attempts.fetch_add(1, Ordering::Relaxed);

        if self
            .store
            .failing_placements
            .read()
            .unwrap()
            .contains(&placement.block_id)
        {
            return Err(StoreError::new(StoreErrorKind::Unavailable)
                .with_context(format!("block {}", placement.block_id))
                .with_backend(BACKEND));
        }

        let block = self.blocks.get_mut(&placement.block_id).ok_or_else(|| {
            StoreError::not_found(format!("block {}", placement.block_id)).with_backend(BACKEND)
        })?;
        block.parent_id = Some(placement.parent_id);
        block.position = placement.position;
        block.page_id = placement.page_id;
        self.touched.insert(placement.block_id);
        Ok(())
    }

    async fn sibling_positions(
        &mut self,
        page_id: PageId,
        parent_id: Option<BlockId>,
    ) -> Result<Vec<(BlockId, u32)>, StoreError> {
        Ok(sorted_siblings(self.blocks.values(), page_id, parent_id))
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let mut state = self.store.state.lock().unwrap();
        for id in &self.touched {
            if let Some(block) = self.blocks.remove(id) {
                state.blocks.insert(*id, block);
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_store() -> MockStore {
        MockStore::new()
            .with_route_page(1, "homepage")
            .with_block(2, 1, None, 1, "core.container")
            .with_block(4, 1, Some(2), 2, "core.action")
            .with_block(3, 1, Some(2), 1, "core.text")
    }

    #[tokio::test]
    async fn test_fetch_blocks_orders_by_position() {
        let store = sample_store();

        let blocks = store.fetch_blocks(PageId(1)).await.unwrap();

        let ids: Vec<i64> = blocks.iter().map(|b| b.id.0).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(store.block_queries(), 1);
    }

    #[tokio::test]
    async fn test_fetch_page_by_route_and_slug() {
        let store = sample_store().with_slug_page(5, "about");

        let by_route = store.fetch_page_by_route("homepage").await.unwrap();
        let by_slug = store.fetch_page_by_slug("about").await.unwrap();
        let missing = store.fetch_page_by_slug("missing").await.unwrap();

        assert_eq!(by_route.unwrap().id, PageId(1));
        assert_eq!(by_slug.unwrap().id, PageId(5));
        assert!(missing.is_none());
        assert_eq!(store.route_queries(), 1);
        assert_eq!(store.slug_queries(), 2);
    }

    #[tokio::test]
    async fn test_create_page_rejects_duplicate_route() {
        let store = sample_store();
        let page = NewPage::for_route("homepage", None, Utc::now());

        let err = store.create_page(&page).await.unwrap_err();

        assert_eq!(err.kind, StoreErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_page_assigns_next_id() {
        let store = sample_store();
        let page = NewPage::for_route("contact", None, Utc::now());

        let created = store.create_page(&page).await.unwrap();

        assert_eq!(created.id, PageId(2));
        assert_eq!(store.page_count(), 2);
    }

    #[tokio::test]
    async fn test_transaction_commit_publishes_writes() {
        let store = sample_store();
        let mut tx = store.begin().await.unwrap();
        tx.update_block_placement(&BlockPlacement {
            block_id: BlockId(4),
            parent_id: BlockId(2),
            position: 1,
            page_id: PageId(1),
        })
        .await
        .unwrap();

        assert_eq!(store.block(4).unwrap().position, 2);
        tx.commit().await.unwrap();

        assert_eq!(store.block(4).unwrap().position, 1);
    }

    #[tokio::test]
    async fn test_commit_keeps_rows_written_after_begin() {
        let store = sample_store();
        let mut tx = store.begin().await.unwrap();
        tx.update_block_placement(&BlockPlacement {
            block_id: BlockId(4),
            parent_id: BlockId(2),
            position: 1,
            page_id: PageId(1),
        })
        .await
        .unwrap();

        let created = store
            .create_block(&NewBlock {
                page_id: PageId(1),
                parent_id: Some(BlockId(2)),
                position: 3,
                block_type: "core.text".to_owned(),
                name: None,
                settings: serde_json::json!({}),
            })
            .await
            .unwrap();
        let mut other = store.begin().await.unwrap();
        other
            .update_block_placement(&BlockPlacement {
                block_id: BlockId(3),
                parent_id: BlockId(2),
                position: 2,
                page_id: PageId(1),
            })
            .await
            .unwrap();
        other.commit().await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.block(created.id.0).is_some());
        assert_eq!(store.block(3).unwrap().position, 2);
        assert_eq!(store.block(4).unwrap().position, 1);
    }

    #[tokio::test]
    async fn test_transaction_drop_discards_writes() {
        let store = sample_store();
        {
            let mut tx = store.begin().await.unwrap();
            tx.update_block_placement(&BlockPlacement {
                block_id: BlockId(3),
                parent_id: BlockId(2),
                position: 9,
                page_id: PageId(1),
            })
            .await
            .unwrap();
            let location = tx.block_location(BlockId(3)).await.unwrap().unwrap();
            assert_eq!(location.parent_id, Some(BlockId(2)));
        }

        assert_eq!(store.block(3).unwrap().position, 1);
    }

    #[tokio::test]
    async fn test_failing_placement_returns_unavailable() {
        let store = sample_store().failing_placement(3);
        let mut tx = store.begin().await.unwrap();

        let err = tx
            .update_block_placement(&BlockPlacement {
                block_id: BlockId(3),
                parent_id: BlockId(2),
                position: 1,
                page_id: PageId(1),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, StoreErrorKind::Unavailable);
        assert_eq!(store.placement_attempts(), 1);
    }

    #[tokio::test]
    async fn test_sibling_positions_sorted() {
        let store = sample_store();
        let mut tx = store.begin().await.unwrap();

        let siblings = tx
            .sibling_positions(PageId(1), Some(BlockId(2)))
            .await
            .unwrap();

        assert_eq!(siblings, vec![(BlockId(3), 1), (BlockId(4), 2)]);
    }
}
