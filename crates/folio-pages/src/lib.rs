//! Page resolution and nested block tree management for Folio.
//!
//! This crate provides:
//! - [`PageResolver`]: route/slug to page resolution with lazy page creation
//! - [`TreeLoader`] and [`BlockTree`]: flat block rows to an ordered tree
//! - [`PositionEditor`]: transactional rewrite of block placement from an
//!   [`EditedTree`]
//! - [`RendererRegistry`]: block rendering keyed by block type
//!
//! # Quick Start
//!
//! ```ignore
//! use folio_pages::{PageResolver, PositionEditor, RendererRegistry, ResolverConfig};
//! use folio_store_sqlite::{SqliteOptions, SqliteStore};
//!
//! let store = SqliteStore::connect(&SqliteOptions::default()).await?;
//! let resolver = PageResolver::new(&store, ResolverConfig::default());
//!
//! let page = resolver.resolve_page_for_route("homepage").await?;
//! let html = RendererRegistry::with_builtin().render_page(&page);
//!
//! let edited = serde_json::from_str(r#"{"cms-block-2": {"type": "core.container"}}"#)?;
//! let report = PositionEditor::new(&store).save_position(&edited).await?;
//! resolver.apply_report(&report);
//! ```

mod block_tree;
mod edited_tree;
mod page;
mod page_cache;
mod page_resolver;
mod position_editor;
mod render;
mod tree_loader;

pub use block_tree::{BlockTree, OrphanPolicy, TreeError};
pub use edited_tree::{EditedNode, EditedTree, block_code, parse_block_code};
pub use page::Page;
pub use page_cache::{MemoryPageCache, NullPageCache, PageCache};
pub use page_resolver::{
    PageResolver, RequestScope, ResolveError, ResolverConfig, RouteMatch, SLUG_PARAM,
};
pub use position_editor::{Assignment, EditError, EditPlan, EditReport, PageLocks, PositionEditor};
pub use render::{
    BlockRenderer, ContainerRenderer, RenderContext, RenderError, RendererRegistry, TextRenderer,
};
pub use tree_loader::TreeLoader;
