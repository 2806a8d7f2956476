//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Ask questions about your PDFs: ingest them into a vector store, then
/// answer prompts with retrieved context.
#[derive(Debug, Parser)]
#[command(name = "pdfrag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check backend status (embedding server, vector store, job ledger)
    Status,

    /// Extract and ingest PDF files into a collection
    Ingest(commands::IngestArgs),

    /// Search ingested content
    Search(commands::SearchArgs),

    /// Answer a prompt using retrieved document context
    Ask(commands::AskArgs),

    /// Manage vector collections
    #[command(subcommand)]
    Collection(commands::CollectionCommand),

    /// Inspect and retry ingestion jobs
    #[command(subcommand)]
    Jobs(commands::JobsCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
