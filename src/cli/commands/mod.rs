mod ask;
mod collection;
mod config;
mod ingest;
mod jobs;
mod search;
mod status;

pub use ask::AskArgs;
pub use collection::CollectionCommand;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use jobs::JobsCommand;
pub use search::SearchArgs;

pub use ask::handle_ask;
pub use collection::handle_collection;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use jobs::handle_jobs;
pub use search::handle_search;
pub use status::handle_status;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::{Config, IngestJob, JobEvent, VectorDriver};
use crate::services::{IngestRunner, JobStore};

fn open_job_store(config: &Config) -> Result<JobStore> {
    let path = config
        .jobs_db_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine data directory for the job ledger"))?;
    JobStore::open(&path).with_context(|| format!("failed to open job ledger {}", path.display()))
}

/// Commands that write vectors need a store that outlives the process.
fn require_persistent_store(config: &Config, action: &str) -> Result<()> {
    if config.vector_store.driver == VectorDriver::Memory {
        anyhow::bail!(
            "cannot {action} with the in-memory vector store: its contents are lost when pdfrag exits. \
             Set vector_store.driver to qdrant or postgresql."
        );
    }
    Ok(())
}

/// Ask a yes/no question on stdout; only an explicit `y` confirms.
fn confirm(question: &str) -> Result<bool> {
    println!("{} [y/N]", style(question).yellow());
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Wait until every job in `ids` has finished, showing progress, then shut
/// the runner down and return the final ledger rows in `ids` order.
async fn wait_for_jobs(
    runner: IngestRunner,
    mut events: broadcast::Receiver<JobEvent>,
    ids: &[String],
    verbose: bool,
) -> Result<Vec<IngestJob>> {
    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let pending: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut finished: HashSet<String> = HashSet::new();

    while finished.len() < pending.len() {
        match events.recv().await {
            Ok(event) if pending.contains(event.job_id()) => match event {
                JobEvent::Started { id, attempt } => {
                    if attempt > 1 {
                        pb.println(format!(
                            "{} retrying job {} (attempt {attempt})",
                            style("!").yellow(),
                            &id[..id.len().min(8)]
                        ));
                    }
                    if let Ok(job) = runner.jobs().get(&id) {
                        pb.set_message(job.pdf_path.display().to_string());
                    }
                }
                JobEvent::Succeeded {
                    id,
                    source,
                    chunks_stored,
                    ..
                } => {
                    if verbose {
                        pb.println(format!("{} {source}: {chunks_stored} chunk(s)", style("✓").green()));
                    }
                    finished.insert(id);
                    pb.inc(1);
                }
                JobEvent::Failed { id, error, .. } => {
                    pb.println(format!("{} {}: {error}", style("✗").red(), &id[..id.len().min(8)]));
                    finished.insert(id);
                    pb.inc(1);
                }
                JobEvent::Skipped { id, status } => {
                    if verbose {
                        pb.println(format!("{} {}: already {status}", style("-").dim(), &id[..id.len().min(8)]));
                    }
                    finished.insert(id);
                    pb.inc(1);
                }
            },
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {
                // Missed events; fall back to the ledger.
                for id in ids {
                    if runner.jobs().get(id)?.status.is_finished() {
                        finished.insert(id.clone());
                    }
                }
                pb.set_position(finished.len() as u64);
            }
            Err(RecvError::Closed) => break,
        }
    }

    pb.finish_and_clear();
    let jobs = runner.jobs().clone();
    runner.shutdown().await;

    ids.iter()
        .map(|id| jobs.get(id).map_err(Into::into))
        .collect()
}
