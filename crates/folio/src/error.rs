//! CLI error types.

use folio_config::ConfigError;
use folio_pages::{EditError, ResolveError, TreeError};
use folio_store::StoreError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid edited tree: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Tree(#[from] TreeError),

    #[error("{0}")]
    Resolve(#[from] ResolveError),

    #[error("Block positions not saved: {0}")]
    Edit(#[from] EditError),

    #[error("No page with slug {0:?}")]
    NotFound(String),
}
