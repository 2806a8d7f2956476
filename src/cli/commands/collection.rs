use anyhow::{Context, Result};
use clap::Subcommand;

use super::{confirm, require_persistent_store};
use crate::cli::output::{CollectionStatus, get_formatter};
use crate::context::AppContext;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum CollectionCommand {
    /// Show point count and dimension
    Info {
        /// Collection name (default: retrieval.collection)
        #[arg(long, short = 'n')]
        name: Option<String>,
    },

    /// Drop the collection and recreate it empty
    Reset {
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// Delete the collection
    Delete {
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },
}

pub async fn handle_collection(
    cmd: CollectionCommand,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let default_name = config.retrieval.collection.clone();

    match cmd {
        CollectionCommand::Info { name } => {
            let name = name.unwrap_or(default_name);
            let ctx = AppContext::from_config(config).await?;
            let info = ctx
                .store
                .collection_info(&name)
                .await
                .context("failed to read collection info")?;

            let status = CollectionStatus {
                name,
                exists: info.is_some(),
                points: info.map_or(0, |i| i.points_count),
                dimension: info.map(|i| i.dimension),
            };
            print!("{}", formatter.format_collection(&status));
        }
        CollectionCommand::Reset { name, force } => {
            let name = name.unwrap_or(default_name);
            require_persistent_store(&config, "reset a collection")?;
            if !force && !confirm(&format!("This will delete ALL records in '{name}'. Continue?"))? {
                print!("{}", formatter.format_message("Cancelled."));
                return Ok(());
            }

            let ctx = AppContext::from_config(config).await?;
            let dimension = ctx.collection_size();
            if verbose {
                eprintln!("Recreating '{name}' with dimension {dimension}");
            }
            ctx.store
                .reset_collection(&name, dimension)
                .await
                .context("failed to reset collection")?;
            print!(
                "{}",
                formatter.format_message(&format!("Collection '{name}' reset ({dimension} dimensions)."))
            );
        }
        CollectionCommand::Delete { name, force } => {
            let name = name.unwrap_or(default_name);
            if !force && !confirm(&format!("This will delete the collection '{name}'. Continue?"))? {
                print!("{}", formatter.format_message("Cancelled."));
                return Ok(());
            }

            let ctx = AppContext::from_config(config).await?;
            let deleted = ctx
                .store
                .delete_collection(&name)
                .await
                .context("failed to delete collection")?;
            let message = if deleted {
                format!("Collection '{name}' deleted.")
            } else {
                format!("Collection '{name}' does not exist.")
            };
            print!("{}", formatter.format_message(&message));
        }
    }

    Ok(())
}
