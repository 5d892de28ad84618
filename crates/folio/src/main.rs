//! Folio CLI - CMS page/block engine.
//!
//! Provides commands for:
//! - `init`: Create the database schema and default template
//! - `show`: Print a page's block tree
//! - `render`: Render a page's blocks to HTML
//! - `reorder`: Apply an edited block tree

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{GlobalArgs, InitArgs, RenderArgs, ReorderArgs, ShowArgs};
use output::Output;

/// Folio - CMS page/block engine.
#[derive(Parser)]
#[command(name = "folio", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and default template.
    Init(InitArgs),
    /// Print the block tree of a page.
    Show(ShowArgs),
    /// Render the blocks of a page to HTML.
    Render(RenderArgs),
    /// Apply an edited block tree from a JSON file.
    Reorder(ReorderArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.global.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            output.error(&format!("Error: failed to start runtime: {err}"));
            std::process::exit(1);
        }
    };

    let global = cli.global;
    let result = rt.block_on(async move {
        match cli.command {
            Commands::Init(args) => args.execute(&global).await,
            Commands::Show(args) => args.execute(&global).await,
            Commands::Render(args) => args.execute(&global).await,
            Commands::Reorder(args) => args.execute(&global).await,
        }
    });

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
