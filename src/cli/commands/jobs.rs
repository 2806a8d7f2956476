use anyhow::Result;
use clap::Subcommand;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use super::{open_job_store, require_persistent_store, wait_for_jobs};
use crate::cli::output::{IngestSummary, get_formatter};
use crate::context::AppContext;
use crate::models::{Config, JobEvent, JobStatus, OutputFormat};
use crate::services::{IngestRunner, JobStore};
use crate::utils::retry::RetryConfig;

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// List ingestion jobs, newest first
    List {
        /// Only jobs with this status (queued, running, succeeded, failed)
        #[arg(long, short = 's')]
        status: Option<JobStatus>,

        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,
    },

    /// Show one job (a unique id prefix is enough)
    Show { id: String },

    /// Run failed jobs again
    Retry {
        #[arg(required_unless_present = "failed", conflicts_with = "failed")]
        id: Option<String>,

        /// Retry every failed job
        #[arg(long)]
        failed: bool,
    },

    /// Finish jobs an interrupted run left queued or running
    Resume,
}

pub async fn handle_jobs(cmd: JobsCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let jobs = Arc::new(open_job_store(&config)?);

    match cmd {
        JobsCommand::List { status, limit } => {
            print!("{}", formatter.format_jobs(&jobs.list(status, limit)?));
        }
        JobsCommand::Show { id } => {
            let id = jobs.resolve_id(&id)?;
            print!("{}", formatter.format_job(&jobs.get(&id)?));
        }
        JobsCommand::Retry { id, failed } => {
            let ids = if failed {
                jobs.list(Some(JobStatus::Failed), usize::MAX)?
                    .into_iter()
                    .map(|j| j.id)
                    .collect()
            } else {
                let prefix = id.ok_or_else(|| anyhow::anyhow!("a job id or --failed is required"))?;
                vec![jobs.resolve_id(&prefix)?]
            };
            if ids.is_empty() {
                print!("{}", formatter.format_message("No failed jobs to retry."));
                return Ok(());
            }

            let runner = start_runner(config, Arc::clone(&jobs)).await?;
            let events = runner.subscribe();
            for id in &ids {
                runner.retry(id)?;
            }
            finish(runner, events, &ids, format, verbose).await?;
        }
        JobsCommand::Resume => {
            let runner = start_runner(config, Arc::clone(&jobs)).await?;
            let events = runner.subscribe();
            let ids = runner.recover()?;
            if ids.is_empty() {
                runner.shutdown().await;
                print!("{}", formatter.format_message("No unfinished jobs."));
                return Ok(());
            }
            finish(runner, events, &ids, format, verbose).await?;
        }
    }

    Ok(())
}

async fn start_runner(config: Config, jobs: Arc<JobStore>) -> Result<IngestRunner> {
    require_persistent_store(&config, "run ingestion jobs")?;
    let retry = RetryConfig::from(&config.jobs);
    let ctx = Arc::new(AppContext::from_config(config).await?);
    Ok(IngestRunner::start(ctx, jobs, retry))
}

async fn finish(
    runner: IngestRunner,
    events: broadcast::Receiver<JobEvent>,
    ids: &[String],
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let start_time = Instant::now();
    let jobs = wait_for_jobs(runner, events, ids, verbose).await?;

    let collection = jobs
        .first()
        .map(|j| j.collection.clone())
        .unwrap_or_default();
    let summary = IngestSummary {
        collection,
        files_found: jobs.len() as u64,
        files_skipped: 0,
        jobs,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", get_formatter(format).format_ingest_summary(&summary));

    let failed = summary.failed();
    if failed > 0 {
        anyhow::bail!("{failed} of {} job(s) failed again", summary.jobs.len());
    }
    Ok(())
}
