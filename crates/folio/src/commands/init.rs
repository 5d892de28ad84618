//! `folio init` command implementation.

use chrono::Utc;
use clap::Args;
use folio_pages::PageResolver;
use folio_store::{
    BlockId, NewBlock, NewPage, NewTemplate, PageId, Store, StoreError, TemplateId,
};
use folio_store_sqlite::SqliteStore;
use serde_json::json;

use super::{GlobalArgs, resolver_config};
use crate::error::CliError;
use crate::output::Output;

const SEED_ROUTE: &str = "homepage";
const SEED_SLUG: &str = "about-us";

/// Arguments for the init command.
#[derive(Args)]
pub(crate) struct InitArgs {
    /// Also create demo pages with a few blocks.
    #[arg(long)]
    seed: bool,
}

impl InitArgs {
    /// Execute the init command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the database cannot be set up.
    pub(crate) async fn execute(self, global: &GlobalArgs) -> Result<(), CliError> {
        let output = Output::new();
        let (config, store) = global.open().await?;

        store.migrate().await?;
        output.info(&format!("Database: {}", config.database.url));

        let default_id = TemplateId(config.templates.default_id);
        if store.fetch_template(default_id).await?.is_none() {
            let template = store
                .create_template(&NewTemplate {
                    name: "default".to_owned(),
                    path: "templates/default.html".to_owned(),
                })
                .await?;
            if template.id == default_id {
                output.info(&format!("Created default template {}", template.id));
            } else {
                output.warning(&format!(
                    "Created template {} but templates.default_id is {default_id}",
                    template.id
                ));
            }
        }

        if self.seed {
            let resolver = PageResolver::new(&store, resolver_config(&config));
            let home = resolver.resolve_page_for_route(SEED_ROUTE).await?;
            if home.tree.as_ref().is_some_and(|tree| !tree.is_empty()) {
                output.warning(&format!("Route {SEED_ROUTE:?} already has blocks, not seeding"));
            } else {
                seed_home(&store, home.id()).await?;
                output.info(&format!("Seeded route {SEED_ROUTE:?}"));
            }

            if store.fetch_page_by_slug(SEED_SLUG).await?.is_none() {
                seed_about(&store).await?;
                output.info(&format!("Seeded slug {SEED_SLUG:?}"));
            }
        }

        output.success("Database ready");
        Ok(())
    }
}

async fn add_block(
    store: &SqliteStore,
    page_id: PageId,
    parent_id: Option<BlockId>,
    position: u32,
    block_type: &str,
    settings: serde_json::Value,
) -> Result<BlockId, StoreError> {
    let block = store
        .create_block(&NewBlock {
            page_id,
            parent_id,
            position,
            block_type: block_type.to_owned(),
            name: None,
            settings,
        })
        .await?;
    Ok(block.id)
}

async fn seed_home(store: &SqliteStore, page: PageId) -> Result<(), StoreError> {
    let hero = add_block(store, page, None, 1, "core.container", json!({"class": "hero"})).await?;
    add_block(store, page, Some(hero), 1, "core.text", json!({"content": "Welcome"})).await?;
    add_block(
        store,
        page,
        Some(hero),
        2,
        "core.text",
        json!({"content": "Edit this page with folio reorder"}),
    )
    .await?;
    add_block(store, page, None, 2, "core.container", json!({})).await?;
    Ok(())
}

async fn seed_about(store: &SqliteStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let page = store
        .create_page(&NewPage {
            name: "About us".to_owned(),
            route_name: None,
            slug: Some(SEED_SLUG.to_owned()),
            template_id: None,
            enabled: true,
            login_required: false,
            created_at: now,
            updated_at: now,
        })
        .await?;
    add_block(store, page.id, None, 1, "core.text", json!({"content": "About us"})).await?;
    Ok(())
}
