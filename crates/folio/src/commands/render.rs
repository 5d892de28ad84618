//! `folio render` command implementation.

use clap::Args;
use folio_pages::{PageResolver, RendererRegistry};

use super::{GlobalArgs, PageSelector, resolver_config};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    #[command(flatten)]
    page: PageSelector,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be resolved. Individual block
    /// failures are logged and render as nothing.
    pub(crate) async fn execute(self, global: &GlobalArgs) -> Result<(), CliError> {
        let output = Output::new();
        let (config, store) = global.open().await?;
        let resolver = PageResolver::new(&store, resolver_config(&config));

        let page = self.page.resolve(&resolver).await?;
        let html = RendererRegistry::with_builtin().render_page(&page);

        output.data(&html);
        Ok(())
    }
}
