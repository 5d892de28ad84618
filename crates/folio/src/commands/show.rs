//! `folio show` command implementation.

use clap::Args;
use folio_pages::{BlockTree, PageResolver, block_code};

use super::{GlobalArgs, PageSelector, resolver_config};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the show command.
#[derive(Args)]
pub(crate) struct ShowArgs {
    #[command(flatten)]
    page: PageSelector,

    /// Print the tree as edited-tree JSON, ready for `folio reorder`.
    #[arg(long)]
    json: bool,
}

impl ShowArgs {
    /// Execute the show command.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be resolved or its tree cannot be loaded.
    pub(crate) async fn execute(self, global: &GlobalArgs) -> Result<(), CliError> {
        let output = Output::new();
        let (config, store) = global.open().await?;
        let resolver = PageResolver::new(&store, resolver_config(&config));

        let page = self.page.resolve(&resolver).await?;
        let empty = BlockTree::empty(page.id());
        let tree = page.tree.as_ref().unwrap_or(&empty);

        if self.json {
            output.data(&serde_json::to_string_pretty(&tree.to_edited_tree())?);
            return Ok(());
        }

        output.info(&format!(
            "Page {} {} ({} blocks)",
            page.id(),
            page.address(),
            tree.len()
        ));
        for line in tree_lines(tree, &output) {
            output.data(&line);
        }
        Ok(())
    }
}

/// Indented lines for a tree, one block per line.
fn tree_lines(tree: &BlockTree, output: &Output) -> Vec<String> {
    tree.depth_first()
        .into_iter()
        .map(|(depth, block)| {
            let label = block
                .name
                .as_deref()
                .map(|name| format!(" {name:?}"))
                .unwrap_or_default();
            format!(
                "{}{} {}{label} {}",
                "  ".repeat(depth),
                block_code(block.id),
                block.block_type,
                output.dimmed(&format!("pos {}", block.position)),
            )
        })
        .collect()
}
