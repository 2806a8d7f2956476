//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{open_job_store, require_persistent_store, wait_for_jobs};
use crate::cli::output::{IngestSummary, get_formatter};
use crate::context::AppContext;
use crate::models::{Config, OutputFormat};
use crate::services::IngestRunner;
use crate::services::loader::MIN_CHUNK_SIZE;
use crate::utils::file::{calculate_file_checksum, collect_pdfs, is_pdf_file};
use crate::utils::retry::RetryConfig;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// PDF files or directories containing PDFs
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Target collection (default: ingest.collection from config)
    #[arg(long, short = 'c')]
    pub collection: Option<String>,

    /// Chunk size in bytes (default: ingest.chunk_size from config)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// File patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// Show what would be ingested without ingesting
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let collection = args
        .collection
        .unwrap_or_else(|| config.ingest.collection.clone());
    if collection.trim().is_empty() {
        anyhow::bail!("collection name cannot be empty");
    }
    let chunk_size = args.chunk_size.unwrap_or(config.ingest.chunk_size);
    if chunk_size < MIN_CHUNK_SIZE {
        anyhow::bail!("chunk size must be at least {MIN_CHUNK_SIZE} bytes");
    }

    let exclude: Vec<String> = args
        .exclude
        .into_iter()
        .chain(config.ingest.exclude_patterns.iter().cloned())
        .collect();

    let mut found = Vec::new();
    for path in &args.paths {
        let path = path
            .canonicalize()
            .with_context(|| format!("invalid path: {}", path.display()))?;
        let pdfs = collect_pdfs(&path, &exclude)
            .with_context(|| format!("failed to scan {}", path.display()))?;
        found.extend(pdfs);
    }
    found.sort();
    found.dedup();

    let files_found = found.len() as u64;
    let (files, skipped) = select_pdfs(found)?;
    if verbose {
        for (path, reason) in &skipped {
            eprintln!("Skipping {}: {reason}", path.display());
        }
    }

    if files.is_empty() {
        print!("{}", formatter.format_message("No PDF files found to ingest."));
        return Ok(());
    }

    if args.dry_run {
        print!(
            "{}",
            formatter.format_message(&format!(
                "Dry run: would ingest {} PDF(s) into '{collection}'",
                files.len()
            ))
        );
        for file in &files {
            println!("  {}", file.display());
        }
        return Ok(());
    }

    require_persistent_store(&config, "ingest")?;
    let jobs = Arc::new(open_job_store(&config)?);
    let retry = RetryConfig::from(&config.jobs);
    let ctx = Arc::new(AppContext::from_config(config).await?);

    let runner = IngestRunner::start(ctx, jobs, retry);
    let events = runner.subscribe();

    let mut ids = Vec::with_capacity(files.len());
    for file in &files {
        ids.push(runner.submit(file, &collection, chunk_size)?);
    }
    debug!(count = ids.len(), collection = %collection, "submitted ingestion jobs");

    let jobs = wait_for_jobs(runner, events, &ids, verbose).await?;

    let summary = IngestSummary {
        collection,
        files_found,
        files_skipped: skipped.len() as u64,
        jobs,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_ingest_summary(&summary));

    let failed = summary.failed();
    if failed > 0 {
        anyhow::bail!(
            "{failed} of {} PDF(s) failed to ingest; see `pdfrag jobs list --status failed`",
            summary.jobs.len()
        );
    }

    Ok(())
}

/// Drop files that are not PDFs or duplicate the content of an earlier file.
/// Returns the files to ingest and the skipped ones with a reason.
fn select_pdfs(files: Vec<PathBuf>) -> Result<(Vec<PathBuf>, Vec<(PathBuf, String)>)> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut selected = Vec::new();
    let mut skipped = Vec::new();

    for file in files {
        if !is_pdf_file(&file) {
            skipped.push((file, "not a PDF file".to_string()));
            continue;
        }

        let checksum = calculate_file_checksum(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        if let Some(original) = seen.get(&checksum) {
            let reason = format!("same content as {}", original.display());
            skipped.push((file, reason));
            continue;
        }

        seen.insert(checksum, file.clone());
        selected.push(file);
    }

    Ok((selected, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_pdfs_skips_non_pdf_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        let copy = dir.path().join("copy.pdf");
        let fake = dir.path().join("fake.pdf");
        std::fs::write(&a, b"%PDF-1.4 first").unwrap();
        std::fs::write(&b, b"%PDF-1.4 second").unwrap();
        std::fs::write(&copy, b"%PDF-1.4 first").unwrap();
        std::fs::write(&fake, b"plain text").unwrap();

        let (selected, skipped) =
            select_pdfs(vec![a.clone(), b.clone(), copy.clone(), fake.clone()]).unwrap();

        assert_eq!(selected, vec![a, b]);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].0, copy);
        assert!(skipped[0].1.contains("a.pdf"));
        assert_eq!(skipped[1], (fake, "not a PDF file".to_string()));
    }
}
