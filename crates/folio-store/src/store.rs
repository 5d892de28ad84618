//! Store traits and error types.
//!
//! Provides the core [`Store`] trait for reading pages, templates and blocks,
//! [`StoreTransaction`] for atomic placement rewrites, and [`StoreError`] for
//! unified error handling across backends.
//!
//! # Transactions
//!
//! [`Store::begin`] opens a transaction. Work done through the returned
//! [`StoreTransaction`] becomes visible only after [`StoreTransaction::commit`];
//! [`StoreTransaction::rollback`] or dropping the transaction discards it.

use std::future::Future;

use crate::record::{
    BlockId, BlockLocation, BlockPlacement, BlockRecord, NewBlock, NewPage, NewTemplate, PageId,
    PageRecord, Template, TemplateId,
};

/// Semantic error categories.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// Row does not exist.
    NotFound,
    /// Row already exists (unique route name or slug).
    AlreadyExists,
    /// Concurrent modification detected.
    Conflict,
    /// Persisted data violates an invariant (bad column value, dangling reference).
    Integrity,
    /// Backend is temporarily unavailable.
    Unavailable,
    /// Operation timed out.
    Timeout,
    /// Other/unknown error category.
    Other,
}

/// Store error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StoreError {
    /// Semantic error category.
    pub kind: StoreErrorKind,
    /// What was being accessed (e.g. "block 12", "page route homepage").
    pub context: Option<String>,
    /// Backend identifier (e.g., "Sqlite", "Mock").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(kind: StoreErrorKind) -> Self {
        Self {
            kind,
            context: None,
            backend: None,
            source: None,
        }
    }

    /// Attach context describing the accessed row.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a not found error with context.
    #[must_use]
    pub fn not_found(context: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound).with_context(context)
    }

    /// Create an integrity error with context.
    #[must_use]
    pub fn integrity(context: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Integrity).with_context(context)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: source (context: block 12)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StoreErrorKind::NotFound => "Not found",
            StoreErrorKind::AlreadyExists => "Already exists",
            StoreErrorKind::Conflict => "Conflict",
            StoreErrorKind::Integrity => "Integrity violation",
            StoreErrorKind::Unavailable => "Unavailable",
            StoreErrorKind::Timeout => "Timeout",
            StoreErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({context})")?;
        }

        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Store abstraction for pages, templates and blocks.
///
/// Reads happen outside of any explicit transaction. Structural block writes
/// go through [`Store::begin`] so a multi-row reorder is all-or-nothing.
pub trait Store: Send + Sync {
    /// Transaction handle returned by [`Store::begin`].
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Fetch every block of a page, ascending by `position`.
    ///
    /// Blocks with equal positions come back in ascending id order so the
    /// result is deterministic.
    fn fetch_blocks(
        &self,
        page_id: PageId,
    ) -> impl Future<Output = Result<Vec<BlockRecord>, StoreError>> + Send;

    /// Fetch the page attached to an application route.
    fn fetch_page_by_route(
        &self,
        route_name: &str,
    ) -> impl Future<Output = Result<Option<PageRecord>, StoreError>> + Send;

    /// Fetch a CMS page by slug.
    fn fetch_page_by_slug(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<Option<PageRecord>, StoreError>> + Send;

    /// Fetch a template by id.
    fn fetch_template(
        &self,
        id: TemplateId,
    ) -> impl Future<Output = Result<Option<Template>, StoreError>> + Send;

    /// Persist a new page and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreErrorKind::AlreadyExists`] if the route name or slug is taken.
    fn create_page(
        &self,
        page: &NewPage,
    ) -> impl Future<Output = Result<PageRecord, StoreError>> + Send;

    /// Persist a new template.
    fn create_template(
        &self,
        template: &NewTemplate,
    ) -> impl Future<Output = Result<Template, StoreError>> + Send;

    /// Persist a new block.
    fn create_block(
        &self,
        block: &NewBlock,
    ) -> impl Future<Output = Result<BlockRecord, StoreError>> + Send;

    /// Open a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction<'_>, StoreError>> + Send;
}

/// Operations available inside a store transaction.
pub trait StoreTransaction: Send {
    /// Read the current page and parent of a block, including uncommitted
    /// writes made earlier in this transaction.
    fn block_location(
        &mut self,
        block_id: BlockId,
    ) -> impl Future<Output = Result<Option<BlockLocation>, StoreError>> + Send;

    /// Rewrite parent, position and page of one block.
    ///
    /// # Errors
    ///
    /// Returns [`StoreErrorKind::NotFound`] if the block does not exist.
    fn update_block_placement(
        &mut self,
        placement: &BlockPlacement,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// List `(id, position)` of the blocks sharing `(page_id, parent_id)`,
    /// ascending by position then id.
    fn sibling_positions(
        &mut self,
        page_id: PageId,
        parent_id: Option<BlockId>,
    ) -> impl Future<Output = Result<Vec<(BlockId, u32)>, StoreError>> + Send;

    /// Make the transaction's writes durable.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard the transaction's writes.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
