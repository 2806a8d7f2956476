use anyhow::Result;
use console::style;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, JobStatus, OutputFormat, VectorDriver};
use crate::services::{JobStore, create_backend, create_embedder};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let collection = config.retrieval.collection.clone();

    let (embedding_backend, embedding_healthy, embedding_error) =
        match create_embedder(&config.embedding) {
            Ok(embedder) => match embedder.health_check().await {
                Ok(()) => (embedder.describe(), true, None),
                Err(e) => (embedder.describe(), false, Some(e.to_string())),
            },
            Err(e) => (config.embedding.provider.to_string(), false, Some(e.to_string())),
        };

    let (vector_store_connected, collection_points) =
        if let Ok(store) = create_backend(&config.vector_store).await {
            let connected = store.health_check().await.unwrap_or(false);
            let points = if connected {
                store
                    .collection_info(&collection)
                    .await
                    .ok()
                    .flatten()
                    .map(|info| info.points_count)
            } else {
                None
            };
            (connected, points)
        } else {
            (false, None)
        };

    // Only read an existing ledger; status should not create one.
    let counts = config
        .jobs_db_path()
        .filter(|path| path.exists())
        .and_then(|path| JobStore::open(&path).ok())
        .and_then(|store| store.counts().ok())
        .unwrap_or_default();
    let count = |status: JobStatus| counts.get(&status).copied().unwrap_or(0);

    let status = StatusInfo {
        embedding_backend,
        embedding_healthy,
        embedding_error,
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected,
        collection,
        collection_points,
        generation_url: config.generation.url.clone(),
        generation_model: config.generation.model.clone(),
        jobs_queued: count(JobStatus::Queued),
        jobs_running: count(JobStatus::Running),
        jobs_succeeded: count(JobStatus::Succeeded),
        jobs_failed: count(JobStatus::Failed),
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_healthy || !vector_store_connected || status.jobs_queued + status.jobs_running > 0 {
        eprintln!();
        if !embedding_healthy {
            eprintln!(
                "{} Embedding backend not reachable. Start a text-embeddings-inference server at {}",
                style("Warning:").yellow(),
                config.embedding.url
            );
        }
        if !vector_store_connected {
            let hint = match config.vector_store.driver {
                VectorDriver::Qdrant => "Qdrant not running. Start with: docker-compose up -d qdrant",
                VectorDriver::PostgreSQL => "PostgreSQL not accessible. Check connection settings.",
                VectorDriver::Memory => "in-memory store unavailable.",
            };
            eprintln!("{} {hint}", style("Warning:").yellow());
        }
        if status.jobs_queued + status.jobs_running > 0 {
            eprintln!(
                "{} unfinished ingestion jobs found. Finish them with: pdfrag jobs resume",
                style("Hint:").cyan()
            );
        }
    }

    Ok(())
}
