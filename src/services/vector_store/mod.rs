//! Vector store abstraction layer.
//!
//! This module provides a trait-based abstraction over different vector store backends
//! (Qdrant, PostgreSQL/pgvector, in-memory) allowing seamless switching based on configuration.
//! Collections are addressed by name on every call; one backend serves any number of them.

mod memory;
mod pgvector;
mod qdrant;

pub use memory::MemoryBackend;
pub use pgvector::PgVectorBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{
    ChunkPayload, CollectionInfo, SearchResult, VectorDriver, VectorRecord, VectorStoreConfig,
};

/// Abstract trait for vector store operations.
///
/// Backends do not retry; transport failures surface as
/// [`VectorStoreError::StoreUnavailable`].
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the vector store is healthy and accessible.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Returns None if the collection doesn't exist.
    async fn collection_info(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create the collection if it is absent.
    ///
    /// An existing collection with the same dimension is left untouched; one
    /// with a different dimension is a `CollectionError`.
    async fn ensure_collection(&self, collection: &str, dimension: u64)
    -> Result<(), VectorStoreError>;

    /// Drop the collection if present and create it empty.
    async fn reset_collection(&self, collection: &str, dimension: u64)
    -> Result<(), VectorStoreError>;

    /// Returns false when there was nothing to delete.
    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError>;

    /// Insert or replace records by id.
    async fn upsert(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorStoreError>;

    /// Insert a single record under a fresh id and return that id.
    async fn create(
        &self,
        collection: &str,
        vector: Vec<f32>,
        payload: ChunkPayload,
    ) -> Result<String, VectorStoreError> {
        let record = VectorRecord::new(vector, payload);
        let id = record.id.clone();
        self.upsert(collection, vec![record]).await?;
        Ok(id)
    }

    /// Up to `limit` records scoring at least `score_threshold`, best first.
    ///
    /// A missing or empty collection yields an empty result, not an error.
    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, VectorStoreError>;

    /// Number of records in the collection; 0 when it does not exist.
    async fn count(&self, collection: &str) -> Result<u64, VectorStoreError> {
        Ok(self
            .collection_info(collection)
            .await?
            .map_or(0, |info| info.points_count))
    }

    /// Delete every record whose `source` payload equals `source`.
    async fn delete_by_source(&self, collection: &str, source: &str)
    -> Result<(), VectorStoreError>;

    fn driver(&self) -> VectorDriver;
}

/// Create the vector store backend selected by configuration.
pub async fn create_backend(
    config: &VectorStoreConfig,
) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    match config.driver {
        VectorDriver::Qdrant => Ok(Box::new(QdrantBackend::new(config)?)),
        VectorDriver::PostgreSQL => Ok(Box::new(PgVectorBackend::new(config).await?)),
        VectorDriver::Memory => Ok(Box::new(MemoryBackend::new())),
    }
}

/// Dimension mismatch between an existing collection and the embedder.
pub(crate) fn dimension_mismatch(collection: &str, existing: u64, wanted: u64) -> VectorStoreError {
    VectorStoreError::CollectionError(format!(
        "collection '{}' has dimension {}, expected {}",
        collection, existing, wanted
    ))
}
