//! Mapping from `sqlx` errors to [`StoreError`].

use folio_store::{StoreError, StoreErrorKind};

/// Backend identifier for error messages.
pub(crate) const BACKEND: &str = "Sqlite";

/// Convert an `sqlx` error into a store error with context.
pub(crate) fn store_error(err: sqlx::Error, context: impl Into<String>) -> StoreError {
    let kind = match &err {
        sqlx::Error::RowNotFound => StoreErrorKind::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreErrorKind::AlreadyExists,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreErrorKind::Integrity,
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreErrorKind::Integrity,
        sqlx::Error::PoolTimedOut => StoreErrorKind::Timeout,
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => {
            StoreErrorKind::Unavailable
        }
        _ => StoreErrorKind::Other,
    };

    StoreError::new(kind)
        .with_context(context)
        .with_backend(BACKEND)
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = store_error(sqlx::Error::RowNotFound, "page 3");

        assert_eq!(err.kind, StoreErrorKind::NotFound);
        assert_eq!(err.backend, Some("Sqlite"));
        assert_eq!(err.context.as_deref(), Some("page 3"));
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        let err = store_error(sqlx::Error::PoolTimedOut, "blocks of page 1");

        assert_eq!(err.kind, StoreErrorKind::Timeout);
        assert!(err.downcast_source::<sqlx::Error>().is_some());
    }
}
