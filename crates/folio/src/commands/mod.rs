//! CLI command implementations.

pub(crate) mod init;
pub(crate) mod render;
pub(crate) mod reorder;
pub(crate) mod show;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use folio_config::{CliSettings, Config, OrphanHandling};
use folio_pages::{OrphanPolicy, Page, PageResolver, ResolverConfig};
use folio_store::TemplateId;
use folio_store_sqlite::{SqliteOptions, SqliteStore};

use crate::error::CliError;

pub(crate) use init::InitArgs;
pub(crate) use render::RenderArgs;
pub(crate) use reorder::ReorderArgs;
pub(crate) use show::ShowArgs;

/// Options shared by every command.
#[derive(Args)]
pub(crate) struct GlobalArgs {
    /// Path to configuration file (default: auto-discover folio.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL (overrides config).
    #[arg(long, global = true, env = "FOLIO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Attach blocks whose parent is missing to the page root instead of failing.
    #[arg(long, global = true)]
    pub promote_orphans: bool,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Load configuration with CLI overrides applied.
    pub(crate) fn load_config(&self) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            database_url: self.database_url.clone(),
            orphans: self.promote_orphans.then_some(OrphanHandling::Promote),
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }

    /// Load configuration and open the store it names.
    pub(crate) async fn open(&self) -> Result<(Config, SqliteStore), CliError> {
        let config = self.load_config()?;
        let options = SqliteOptions {
            url: config.database.url.clone(),
            busy_timeout: config.database.busy_timeout(),
            max_connections: config.database.max_connections,
        };
        tracing::info!(url = %options.url, "Opening database");
        let store = SqliteStore::connect(&options).await?;
        Ok((config, store))
    }
}

/// Which page a command operates on.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub(crate) struct PageSelector {
    /// Application route name (the page is created if missing).
    #[arg(long)]
    route: Option<String>,

    /// CMS page slug.
    #[arg(long)]
    slug: Option<String>,
}

impl PageSelector {
    /// Resolve the selected page with its block tree.
    pub(crate) async fn resolve(
        &self,
        resolver: &PageResolver<'_, SqliteStore>,
    ) -> Result<Arc<Page>, CliError> {
        if let Some(route) = &self.route {
            return Ok(resolver.resolve_page_for_route(route).await?);
        }
        let slug = self.slug.as_deref().unwrap_or_default();
        resolver
            .resolve_page_for_slug(slug)
            .await?
            .ok_or_else(|| CliError::NotFound(slug.to_owned()))
    }
}

pub(crate) fn orphan_policy(handling: OrphanHandling) -> OrphanPolicy {
    match handling {
        OrphanHandling::Reject => OrphanPolicy::Reject,
        OrphanHandling::Promote => OrphanPolicy::Promote,
    }
}

pub(crate) fn resolver_config(config: &Config) -> ResolverConfig {
    ResolverConfig {
        default_template: TemplateId(config.templates.default_id),
        orphans: orphan_policy(config.tree.orphans),
        slug_route: config.routing.slug_route.clone(),
    }
}
