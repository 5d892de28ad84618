//! SQLite implementation of [`Store`].

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use folio_store::{
    BlockId, BlockLocation, BlockPlacement, BlockRecord, NewBlock, NewPage, NewTemplate, PageId,
    PageRecord, Store, StoreError, StoreErrorKind, StoreTransaction, Template, TemplateId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite};

use crate::error::{BACKEND, store_error};
use crate::schema::SCHEMA;

const BLOCK_COLUMNS: &str = "id, page_id, parent_id, position, type, name, settings";
const PAGE_COLUMNS: &str =
    "id, name, route_name, slug, template_id, enabled, login_required, created_at, updated_at";

/// Connection settings for [`SqliteStore::connect`].
#[derive(Clone, Debug)]
pub struct SqliteOptions {
    /// Database URL (e.g. `sqlite://folio.db`, `sqlite::memory:`).
    pub url: String,
    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,
    /// Pool size. Forced to 1 for in-memory databases.
    pub max_connections: u32,
}

impl SqliteOptions {
    /// Options for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_owned(),
            ..Self::default()
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            url: "sqlite://folio.db".to_owned(),
            busy_timeout: Duration::from_secs(5),
            max_connections: 4,
        }
    }
}

/// SQLite-backed store.
///
/// Wraps an `sqlx` pool. Each in-memory SQLite connection owns a separate
/// database, so in-memory stores run on a single long-lived connection.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a pool for the given options, creating the database file if needed.
    pub async fn connect(options: &SqliteOptions) -> Result<Self, StoreError> {
        let connect = SqliteConnectOptions::from_str(&options.url)
            .map_err(|e| store_error(e, format!("database url {}", options.url)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);

        let pool_options = if options.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(options.max_connections)
        };

        let pool = pool_options
            .connect_with(connect)
            .await
            .map_err(|e| store_error(e, format!("database url {}", options.url)))?;

        tracing::debug!(url = %options.url, "Opened SQLite pool");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(e, "schema"))?;
        Ok(())
    }
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::integrity(format!("pages.{column} = {value}"))
                .with_backend(BACKEND)
                .with_source(e)
        })
}

fn position_from_column(value: i64, id: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|e| {
        StoreError::integrity(format!("block {id} position {value}"))
            .with_backend(BACKEND)
            .with_source(e)
    })
}

fn block_from_row(row: &SqliteRow) -> Result<BlockRecord, StoreError> {
    let get_err = |e: sqlx::Error| store_error(e, "blocks row");
    let id: i64 = row.try_get("id").map_err(get_err)?;
    let position: i64 = row.try_get("position").map_err(get_err)?;
    let settings: String = row.try_get("settings").map_err(get_err)?;
    let settings = serde_json::from_str(&settings).map_err(|e| {
        StoreError::integrity(format!("block {id} settings"))
            .with_backend(BACKEND)
            .with_source(e)
    })?;

    Ok(BlockRecord {
        id: BlockId(id),
        page_id: PageId(row.try_get("page_id").map_err(get_err)?),
        parent_id: row
            .try_get::<Option<i64>, _>("parent_id")
            .map_err(get_err)?
            .map(BlockId),
        position: position_from_column(position, id)?,
        block_type: row.try_get("type").map_err(get_err)?,
        name: row.try_get("name").map_err(get_err)?,
        settings,
    })
}

fn page_from_row(row: &SqliteRow) -> Result<PageRecord, StoreError> {
    let get_err = |e: sqlx::Error| store_error(e, "pages row");
    let created_at: String = row.try_get("created_at").map_err(get_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(get_err)?;

    Ok(PageRecord {
        id: PageId(row.try_get("id").map_err(get_err)?),
        name: row.try_get("name").map_err(get_err)?,
        route_name: row.try_get("route_name").map_err(get_err)?,
        slug: row.try_get("slug").map_err(get_err)?,
        template_id: row
            .try_get::<Option<i64>, _>("template_id")
            .map_err(get_err)?
            .map(TemplateId),
        enabled: row.try_get("enabled").map_err(get_err)?,
        login_required: row.try_get("login_required").map_err(get_err)?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

impl SqliteStore {
    async fn fetch_page_where(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<PageRecord>, StoreError> {
        tracing::debug!(column, value, "Fetching page");
        let row = sqlx::query(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE {column} = ?"))
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(e, format!("page {column} {value}")))?;
        row.as_ref().map(page_from_row).transpose()
    }
}

impl Store for SqliteStore {
    type Transaction<'a> = SqliteTransaction;

    async fn fetch_blocks(&self, page_id: PageId) -> Result<Vec<BlockRecord>, StoreError> {
        tracing::debug!(page = %page_id, "Fetching blocks");
        let rows = sqlx::query(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE page_id = ? ORDER BY position ASC, id ASC"
        ))
        .bind(page_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error(e, format!("blocks of page {page_id}")))?;

        rows.iter().map(block_from_row).collect()
    }

    async fn fetch_page_by_route(&self, route_name: &str) -> Result<Option<PageRecord>, StoreError> {
        self.fetch_page_where("route_name", route_name).await
    }

    async fn fetch_page_by_slug(&self, slug: &str) -> Result<Option<PageRecord>, StoreError> {
        self.fetch_page_where("slug", slug).await
    }

    async fn fetch_template(&self, id: TemplateId) -> Result<Option<Template>, StoreError> {
        let row = sqlx::query("SELECT id, name, path FROM templates WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(e, format!("template {id}")))?;

        row.map(|row| {
            let get_err = |e: sqlx::Error| store_error(e, "templates row");
            Ok(Template {
                id: TemplateId(row.try_get("id").map_err(get_err)?),
                name: row.try_get("name").map_err(get_err)?,
                path: row.try_get("path").map_err(get_err)?,
            })
        })
        .transpose()
    }

    async fn create_page(&self, page: &NewPage) -> Result<PageRecord, StoreError> {
        let result = sqlx::query(
            "INSERT INTO pages (name, route_name, slug, template_id, enabled, login_required, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&page.name)
        .bind(&page.route_name)
        .bind(&page.slug)
        .bind(page.template_id.map(|t| t.0))
        .bind(page.enabled)
        .bind(page.login_required)
        .bind(page.created_at.to_rfc3339())
        .bind(page.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(e, format!("page {}", page.name)))?;

        Ok(PageRecord {
            id: PageId(result.last_insert_rowid()),
            name: page.name.clone(),
            route_name: page.route_name.clone(),
            slug: page.slug.clone(),
            template_id: page.template_id,
            enabled: page.enabled,
            login_required: page.login_required,
            created_at: page.created_at,
            updated_at: page.updated_at,
        })
    }

    async fn create_template(&self, template: &NewTemplate) -> Result<Template, StoreError> {
        let result = sqlx::query("INSERT INTO templates (name, path) VALUES (?, ?)")
            .bind(&template.name)
            .bind(&template.path)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(e, format!("template {}", template.name)))?;

        Ok(Template {
            id: TemplateId(result.last_insert_rowid()),
            name: template.name.clone(),
            path: template.path.clone(),
        })
    }

    async fn create_block(&self, block: &NewBlock) -> Result<BlockRecord, StoreError> {
        let result = sqlx::query(
            "INSERT INTO blocks (page_id, parent_id, position, type, name, settings) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(block.page_id.0)
        .bind(block.parent_id.map(|p| p.0))
        .bind(i64::from(block.position))
        .bind(&block.block_type)
        .bind(&block.name)
        .bind(block.settings.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(e, format!("block of page {}", block.page_id)))?;

        Ok(BlockRecord {
            id: BlockId(result.last_insert_rowid()),
            page_id: block.page_id,
            parent_id: block.parent_id,
            position: block.position,
            block_type: block.block_type.clone(),
            name: block.name.clone(),
            settings: block.settings.clone(),
        })
    }

    async fn begin(&self) -> Result<SqliteTransaction, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error(e, "begin transaction"))?;
        Ok(SqliteTransaction { tx })
    }
}

/// Open SQLite transaction. Rolls back when dropped without commit.
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl StoreTransaction for SqliteTransaction {
    async fn block_location(&mut self, block_id: BlockId) -> Result<Option<BlockLocation>, StoreError> {
        let row = sqlx::query("SELECT page_id, parent_id FROM blocks WHERE id = ?")
            .bind(block_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| store_error(e, format!("block {block_id}")))?;

        row.map(|row| {
            let get_err = |e: sqlx::Error| store_error(e, format!("block {block_id}"));
            Ok(BlockLocation {
                page_id: PageId(row.try_get("page_id").map_err(get_err)?),
                parent_id: row
                    .try_get::<Option<i64>, _>("parent_id")
                    .map_err(get_err)?
                    .map(BlockId),
            })
        })
        .transpose()
    }

    async fn update_block_placement(&mut self, placement: &BlockPlacement) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE blocks SET parent_id = ?, position = ?, page_id = ? WHERE id = ?")
                .bind(placement.parent_id.0)
                .bind(i64::from(placement.position))
                .bind(placement.page_id.0)
                .bind(placement.block_id.0)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| store_error(e, format!("block {}", placement.block_id)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::new(StoreErrorKind::NotFound)
                .with_context(format!("block {}", placement.block_id))
                .with_backend(BACKEND));
        }
        Ok(())
    }

    async fn sibling_positions(
        &mut self,
        page_id: PageId,
        parent_id: Option<BlockId>,
    ) -> Result<Vec<(BlockId, u32)>, StoreError> {
        // `IS` matches NULL parents as well as concrete ids.
        let rows = sqlx::query(
            "SELECT id, position FROM blocks WHERE page_id = ? AND parent_id IS ? \
             ORDER BY position ASC, id ASC",
        )
        .bind(page_id.0)
        .bind(parent_id.map(|p| p.0))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| store_error(e, format!("siblings in page {page_id}")))?;

        rows.iter()
            .map(|row| {
                let get_err = |e: sqlx::Error| store_error(e, "blocks row");
                let id: i64 = row.try_get("id").map_err(get_err)?;
                let position: i64 = row.try_get("position").map_err(get_err)?;
                Ok((BlockId(id), position_from_column(position, id)?))
            })
            .collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| store_error(e, "commit transaction"))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| store_error(e, "rollback transaction"))
    }
}
