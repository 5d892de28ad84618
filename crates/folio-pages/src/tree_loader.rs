//! Loads a page's blocks into an in-memory tree.

use folio_store::{PageId, Store};

use crate::block_tree::{BlockTree, OrphanPolicy, TreeError};
use crate::page::Page;

/// Builds [`BlockTree`]s from a store.
///
/// The loader only reads. It never mutates persisted blocks.
pub struct TreeLoader<'s, S: Store> {
    store: &'s S,
    orphans: OrphanPolicy,
}

impl<'s, S: Store> TreeLoader<'s, S> {
    /// Create a loader with the default orphan policy.
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            orphans: OrphanPolicy::default(),
        }
    }

    /// Set what happens to blocks whose parent is missing.
    #[must_use]
    pub fn with_orphan_policy(mut self, orphans: OrphanPolicy) -> Self {
        self.orphans = orphans;
        self
    }

    /// Fetch every block of a page and build its tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError`] if the store fails or the blocks do not form a tree.
    pub async fn build_tree(&self, page_id: PageId) -> Result<BlockTree, TreeError> {
        let records = self.store.fetch_blocks(page_id).await?;
        tracing::debug!(page = %page_id, blocks = records.len(), "Fetched page blocks");
        BlockTree::from_records(page_id, records, self.orphans)
    }

    /// Attach a complete block tree to `page`.
    ///
    /// On error the page is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError`] if the store fails or the blocks do not form a tree.
    pub async fn load_tree(&self, page: &mut Page) -> Result<(), TreeError> {
        let tree = self.build_tree(page.id()).await?;
        page.tree = Some(tree);
        Ok(())
    }
}
