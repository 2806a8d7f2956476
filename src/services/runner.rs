//! Queued, persisted ingestion jobs.
//!
//! `submit` records a job in the ledger and returns its id straight away; a
//! single worker task extracts and ingests jobs one after another, retrying
//! retryable failures with backoff. Outcomes are written back to the ledger
//! and broadcast as [`JobEvent`]s.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::extractor::extract_pdf_text;
use super::ingest::IngestService;
use super::jobs::JobStore;
use crate::context::AppContext;
use crate::error::{ExtractError, IngestError, JobError};
use crate::models::{IngestJob, IngestReport, JobEvent};
use crate::utils::file::text_path_for;
use crate::utils::retry::{RetryConfig, RetryResult, with_retry};

const EVENT_CAPACITY: usize = 256;

pub struct IngestRunner {
    jobs: Arc<JobStore>,
    sender: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<JobEvent>,
    worker: JoinHandle<()>,
}

impl IngestRunner {
    /// Spawn the worker. Must be called inside a Tokio runtime.
    pub fn start(ctx: Arc<AppContext>, jobs: Arc<JobStore>, retry: RetryConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let worker = Worker {
            ctx,
            jobs: Arc::clone(&jobs),
            retry,
            events: events.clone(),
        };
        let worker = tokio::spawn(worker.run(receiver));

        Self {
            jobs,
            sender,
            events,
            worker,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Queue extraction and ingestion of `pdf_path` into `collection`.
    pub fn submit(
        &self,
        pdf_path: &Path,
        collection: &str,
        chunk_size: usize,
    ) -> Result<String, JobError> {
        let job = self
            .jobs
            .insert(pdf_path, &text_path_for(pdf_path), collection, chunk_size)?;
        debug!(id = %job.id, pdf = %pdf_path.display(), "job queued");
        self.enqueue(job.id)
    }

    /// Re-queue jobs a previous process left queued or running.
    pub fn recover(&self) -> Result<Vec<String>, JobError> {
        let unfinished = self.jobs.unfinished()?;
        if !unfinished.is_empty() {
            info!(count = unfinished.len(), "recovering unfinished jobs");
        }
        unfinished
            .into_iter()
            .map(|job| self.enqueue(job.id))
            .collect()
    }

    /// Put a failed job back in the queue.
    pub fn retry(&self, id: &str) -> Result<(), JobError> {
        let job = self.jobs.requeue(id)?;
        self.enqueue(job.id).map(|_| ())
    }

    fn enqueue(&self, id: String) -> Result<String, JobError> {
        self.sender
            .send(id.clone())
            .map_err(|_| JobError::QueueClosed)?;
        Ok(id)
    }

    /// Stop accepting jobs and wait for the queue to drain.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            error!("ingestion worker terminated abnormally: {e}");
        }
    }
}

struct Worker {
    ctx: Arc<AppContext>,
    jobs: Arc<JobStore>,
    retry: RetryConfig,
    events: broadcast::Sender<JobEvent>,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<String>) {
        while let Some(id) = receiver.recv().await {
            if let Err(e) = self.process(&id).await {
                error!(id = %id, "job ledger error: {e}");
                let _ = self.events.send(JobEvent::Failed {
                    id,
                    attempts: 0,
                    error: e.to_string(),
                });
            }
        }
        debug!("ingestion worker stopped");
    }

    async fn process(&self, id: &str) -> Result<(), JobError> {
        let job = self.jobs.get(id)?;
        if job.status.is_finished() {
            debug!(id, status = %job.status, "skipping finished job");
            let _ = self.events.send(JobEvent::Skipped {
                id: job.id,
                status: job.status,
            });
            return Ok(());
        }

        self.jobs.mark_running(id)?;

        let mut attempt = 0;
        let outcome = with_retry(&self.retry, || {
            attempt += 1;
            let _ = self.events.send(JobEvent::Started {
                id: job.id.clone(),
                attempt,
            });
            run_job(&self.ctx, &job)
        })
        .await;

        match outcome {
            RetryResult::Success { value, attempts } => {
                self.jobs
                    .mark_succeeded(id, attempts, value.chunks_stored)?;
                info!(
                    id,
                    source = %value.source,
                    chunks = value.chunks_stored,
                    "job succeeded"
                );
                let _ = self.events.send(JobEvent::Succeeded {
                    id: id.to_string(),
                    source: value.source,
                    chunks_stored: value.chunks_stored,
                    chunks_skipped: value.chunks_skipped,
                });
            }
            RetryResult::Failed {
                last_error,
                attempts,
            } => {
                let message = last_error.to_string();
                self.jobs
                    .mark_failed(id, attempts, last_error.chunks_stored(), &message)?;
                warn!(id, attempts, "job failed: {message}");
                let _ = self.events.send(JobEvent::Failed {
                    id: id.to_string(),
                    attempts,
                    error: message,
                });
            }
        }

        Ok(())
    }
}

/// One attempt: extract on the blocking pool, then ingest the text file.
async fn run_job(ctx: &AppContext, job: &IngestJob) -> Result<IngestReport, IngestError> {
    let pdf_path: PathBuf = job.pdf_path.clone();
    let text_path = tokio::task::spawn_blocking(move || extract_pdf_text(&pdf_path))
        .await
        .map_err(|e| ExtractError::Io(std::io::Error::other(e)))??;

    IngestService::from_context(ctx)
        .store_file_content_in_db(
            &text_path,
            job.chunk_size,
            &job.collection,
            ctx.collection_size(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Config, JobStatus};
    use crate::services::embedding::Embedder;
    use crate::services::embedding::testing::{FlakyEmbedder, HashEmbedder};
    use crate::services::extractor::testing::write_text_pdf;
    use crate::services::vector_store::{MemoryBackend, VectorStore};
    use std::time::Duration;

    const DIM: usize = 32;

    fn context(embedder: Arc<dyn Embedder>) -> (Arc<AppContext>, Arc<MemoryBackend>) {
        let store = Arc::new(MemoryBackend::new());
        let ctx = AppContext::new(Config::default(), embedder, store.clone());
        (Arc::new(ctx), store)
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_submitted_job_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("hello.pdf");
        write_text_pdf(&pdf, "Hello World!");

        let (ctx, store) = context(Arc::new(HashEmbedder::new(DIM)));
        let jobs = Arc::new(JobStore::open_in_memory().unwrap());
        let runner = IngestRunner::start(ctx, jobs.clone(), fast_retry(3));
        let mut events = runner.subscribe();

        let id = runner.submit(&pdf, "kb", 512).unwrap();
        runner.shutdown().await;

        let job = jobs.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempts, 1);
        assert!(job.chunks_stored >= 1);
        assert_eq!(job.text_path, dir.path().join("hello.txt"));
        assert!(job.text_path.exists());
        assert_eq!(store.count("kb").await.unwrap(), job.chunks_stored);

        assert!(matches!(events.recv().await.unwrap(), JobEvent::Started { attempt: 1, .. }));
        assert!(matches!(events.recv().await.unwrap(), JobEvent::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_malformed_pdf_fails_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, "not a pdf at all").unwrap();

        let (ctx, store) = context(Arc::new(HashEmbedder::new(DIM)));
        let jobs = Arc::new(JobStore::open_in_memory().unwrap());
        let runner = IngestRunner::start(ctx, jobs.clone(), fast_retry(3));

        let id = runner.submit(&pdf, "kb", 512).unwrap();
        runner.shutdown().await;

        let job = jobs.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.unwrap().contains("failed to parse PDF"));
        assert!(store.collection_info("kb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried_then_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("hello.pdf");
        write_text_pdf(&pdf, "Hello World!");

        let embedder = Arc::new(FlakyEmbedder::new(DIM, 0));
        let (ctx, _store) = context(embedder.clone());
        let jobs = Arc::new(JobStore::open_in_memory().unwrap());
        let runner = IngestRunner::start(ctx, jobs.clone(), fast_retry(3));

        let id = runner.submit(&pdf, "kb", 512).unwrap();
        runner.shutdown().await;

        let job = jobs.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(embedder.calls(), 3);
        assert!(job.last_error.unwrap().contains("embedding"));
    }

    #[tokio::test]
    async fn test_recover_requeues_unfinished_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("left.pdf");
        write_text_pdf(&pdf, "Left over from last run");

        let jobs = Arc::new(JobStore::open_in_memory().unwrap());
        let stale = jobs
            .insert(&pdf, &text_path_for(&pdf), "kb", 512)
            .unwrap();
        jobs.mark_running(&stale.id).unwrap();

        let (ctx, _store) = context(Arc::new(HashEmbedder::new(DIM)));
        let runner = IngestRunner::start(ctx, jobs.clone(), fast_retry(1));
        assert_eq!(runner.recover().unwrap(), vec![stale.id.clone()]);
        runner.shutdown().await;

        assert_eq!(jobs.get(&stale.id).unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_retry_failed_job_after_fix() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("doc.pdf");
        std::fs::write(&pdf, "garbage").unwrap();

        let (ctx, _store) = context(Arc::new(HashEmbedder::new(DIM)));
        let jobs = Arc::new(JobStore::open_in_memory().unwrap());
        let runner = IngestRunner::start(ctx.clone(), jobs.clone(), fast_retry(1));
        let id = runner.submit(&pdf, "kb", 512).unwrap();
        runner.shutdown().await;
        assert_eq!(jobs.get(&id).unwrap().status, JobStatus::Failed);

        write_text_pdf(&pdf, "Fixed document");
        let runner = IngestRunner::start(ctx, jobs.clone(), fast_retry(1));
        runner.retry(&id).unwrap();
        assert!(matches!(
            runner.retry(&id),
            Err(JobError::NotRetryable { .. })
        ));
        runner.shutdown().await;

        let job = jobs.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempts, 2);
        assert!(job.last_error.is_none());
    }

    #[tokio::test]
    async fn test_job_finished_before_worker_reaches_it_is_reported_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("done.pdf");
        write_text_pdf(&pdf, "Already ingested");

        let jobs = Arc::new(JobStore::open_in_memory().unwrap());
        let job = jobs
            .insert(&pdf, &text_path_for(&pdf), "kb", 512)
            .unwrap();

        let (ctx, store) = context(Arc::new(HashEmbedder::new(DIM)));
        let runner = IngestRunner::start(ctx, jobs.clone(), fast_retry(1));
        let mut events = runner.subscribe();
        runner.recover().unwrap();
        // The current-thread test runtime has not polled the worker yet.
        jobs.mark_succeeded(&job.id, 1, 4).unwrap();
        runner.shutdown().await;

        match events.recv().await.unwrap() {
            JobEvent::Skipped { id, status } => {
                assert_eq!(id, job.id);
                assert_eq!(status, JobStatus::Succeeded);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(jobs.get(&job.id).unwrap().chunks_stored, 4);
        assert!(store.collection_info("kb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_error_still_ends_the_job_with_an_event() {
        let (ctx, _store) = context(Arc::new(HashEmbedder::new(DIM)));
        let jobs = Arc::new(JobStore::open_in_memory().unwrap());
        let runner = IngestRunner::start(ctx, jobs, fast_retry(1));
        let mut events = runner.subscribe();

        runner.enqueue("missing".to_string()).unwrap();
        runner.shutdown().await;

        match events.recv().await.unwrap() {
            JobEvent::Failed {
                id,
                attempts,
                error,
            } => {
                assert_eq!(id, "missing");
                assert_eq!(attempts, 0);
                assert!(error.contains("missing"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
