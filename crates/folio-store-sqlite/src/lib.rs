//! SQLite store backend for Folio.
//!
//! Provides [`SqliteStore`], an implementation of [`folio_store::Store`] on
//! top of an `sqlx` connection pool, plus the schema it expects
//! ([`SqliteStore::migrate`]).

mod error;
mod schema;
mod store;

pub use store::{SqliteOptions, SqliteStore, SqliteTransaction};
