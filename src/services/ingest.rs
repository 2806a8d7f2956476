//! Ingestion of an extracted text file into a vector collection.

use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::embedding::Embedder;
use super::loader::load_chunks;
use super::vector_store::VectorStore;
use crate::context::AppContext;
use crate::error::IngestError;
use crate::models::{ChunkPayload, IngestReport};
use crate::utils::{clean, preview, source_name};

/// Chunk → clean → embed → store, one chunk at a time in file order.
pub struct IngestService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl IngestService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        Self::new(Arc::clone(&ctx.embedder), Arc::clone(&ctx.store))
    }

    /// Store every chunk of `filepath` in `collection_name`.
    ///
    /// The collection is created with `collection_size` dimensions if it does
    /// not exist; other documents already stored in it are kept. Records from
    /// an earlier ingestion of the same file (same basename) are replaced.
    ///
    /// On failure nothing is rolled back: the error reports how many chunks
    /// were stored before it happened.
    pub async fn store_file_content_in_db(
        &self,
        filepath: &Path,
        chunk_size: usize,
        collection_name: &str,
        collection_size: u64,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport {
            source: source_name(filepath),
            collection: collection_name.to_string(),
            ..Default::default()
        };

        info!(
            source = %report.source,
            collection = collection_name,
            chunk_size,
            "ingesting document"
        );

        match self
            .ingest(filepath, chunk_size, collection_size, &mut report)
            .await
        {
            Ok(()) => {
                info!(
                    source = %report.source,
                    stored = report.chunks_stored,
                    skipped = report.chunks_skipped,
                    "document ingested"
                );
                Ok(report)
            }
            Err(cause) => Err(IngestError::Interrupted {
                document: report.source,
                chunks_stored: report.chunks_stored,
                cause: Box::new(cause),
            }),
        }
    }

    async fn ingest(
        &self,
        filepath: &Path,
        chunk_size: usize,
        collection_size: u64,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let collection = report.collection.clone();

        self.store
            .ensure_collection(&collection, collection_size)
            .await?;
        self.store
            .delete_by_source(&collection, &report.source)
            .await?;

        let chunks = load_chunks(filepath, chunk_size);
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.try_next().await? {
            let chunk_index = report.chunks_read;
            report.chunks_read += 1;

            let cleaned = clean(&chunk);
            if cleaned.is_empty() {
                report.chunks_skipped += 1;
                continue;
            }

            let vector = self.embedder.embed(&cleaned).await?;
            let payload = ChunkPayload::new(chunk, report.source.clone(), chunk_index);
            let id = self.store.create(&collection, vector, payload).await?;
            report.chunks_stored += 1;

            debug!(id = %id, chunk_index, text = %preview(&cleaned, 60), "stored chunk");
        }

        Ok(())
    }
}
