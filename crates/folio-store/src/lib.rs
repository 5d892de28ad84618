//! Store abstraction for the Folio page/block engine.
//!
//! This crate provides the [`Store`] trait through which the engine reads pages,
//! templates and blocks, and the [`StoreTransaction`] trait through which the
//! position editor rewrites block placement atomically. This enables:
//!
//! - **Unit testing** without a database
//! - **Backend flexibility** (SQLite today, anything with transactions tomorrow)
//! - **Clean separation** between tree logic and persistence
//!
//! # Architecture
//!
//! The crate provides:
//! - [`Store`] trait with page/template/block queries and [`Store::begin`]
//! - [`StoreTransaction`] for placement reads and writes inside a transaction
//! - Plain records ([`BlockRecord`], [`PageRecord`], [`Template`]) and id newtypes
//! - [`MockStore`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use folio_store::{MockStore, PageId, Store};
//!
//! let store = MockStore::new()
//!     .with_route_page(1, "homepage")
//!     .with_block(2, 1, None, 1, "core.container");
//! let blocks = store.fetch_blocks(PageId(1)).await?;
//! ```

#[cfg(feature = "mock")]
mod mock;
mod record;
mod store;

#[cfg(feature = "mock")]
pub use mock::{MockStore, MockTransaction};
pub use record::{
    BlockId, BlockLocation, BlockPlacement, BlockRecord, NewBlock, NewPage, NewTemplate, PageId,
    PageRecord, Template, TemplateId,
};
pub use store::{Store, StoreError, StoreErrorKind, StoreTransaction};
