//! `folio reorder` command implementation.

use std::path::PathBuf;

use clap::Args;
use folio_pages::{EditedTree, PositionEditor};

use super::GlobalArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the reorder command.
#[derive(Args)]
pub(crate) struct ReorderArgs {
    /// JSON file with the edited tree (`-` reads stdin).
    file: PathBuf,
}

impl ReorderArgs {
    /// Execute the reorder command.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the edit is
    /// rejected. A rejected edit changes nothing.
    pub(crate) async fn execute(self, global: &GlobalArgs) -> Result<(), CliError> {
        let output = Output::new();

        let content = if self.file.as_os_str() == "-" {
            std::io::read_to_string(std::io::stdin())?
        } else {
            std::fs::read_to_string(&self.file)?
        };
        let edited: EditedTree = serde_json::from_str(&content)?;

        let (config, store) = global.open().await?;
        let report = PositionEditor::new(&store)
            .with_sibling_verification(config.editor.verify_sibling_positions)
            .save_position(&edited)
            .await?;

        let pages: Vec<String> = report.pages.iter().map(ToString::to_string).collect();
        output.success(&format!(
            "Updated {} blocks under {} anchors on pages [{}]",
            report.updated,
            report.anchors.len(),
            pages.join(", ")
        ));
        Ok(())
    }
}
