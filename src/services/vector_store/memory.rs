//! In-process vector store for tests and offline use.
//!
//! Search is an exhaustive cosine scan; contents are lost with the process.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{VectorStore, dimension_mismatch};
use crate::error::VectorStoreError;
use crate::models::{CollectionInfo, SearchResult, VectorDriver, VectorRecord};

struct MemoryCollection {
    dimension: u64,
    records: HashMap<String, VectorRecord>,
}

impl MemoryCollection {
    fn new(dimension: u64) -> Self {
        Self {
            dimension,
            records: HashMap::new(),
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

#[async_trait]
impl VectorStore for MemoryBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn collection_info(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map(|c| CollectionInfo {
            points_count: c.records.len() as u64,
            dimension: c.dimension,
        }))
    }

    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: u64,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        match collections.get(collection) {
            Some(existing) if existing.dimension != dimension => {
                Err(dimension_mismatch(collection, existing.dimension, dimension))
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(collection.to_string(), MemoryCollection::new(dimension));
                Ok(())
            }
        }
    }

    async fn reset_collection(
        &self,
        collection: &str,
        dimension: u64,
    ) -> Result<(), VectorStoreError> {
        self.collections
            .write()
            .await
            .insert(collection.to_string(), MemoryCollection::new(dimension));
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
        Ok(self.collections.write().await.remove(collection).is_some())
    }

    async fn upsert(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        let target = collections.get_mut(collection).ok_or_else(|| {
            VectorStoreError::UpsertError(format!("collection '{}' doesn't exist", collection))
        })?;

        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.len() as u64 != target.dimension)
        {
            return Err(VectorStoreError::UpsertError(format!(
                "vector dimension {} does not match collection dimension {}",
                bad.vector.len(),
                target.dimension
            )));
        }

        for record in records {
            target.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchResult> = target
            .records
            .values()
            .filter_map(|record| {
                let score = cosine_similarity(&query_vector, &record.vector)? as f32;
                (score >= score_threshold).then(|| SearchResult {
                    id: record.id.clone(),
                    score,
                    original_text: Some(record.payload.original_text.clone()),
                    source: Some(record.payload.source.clone()),
                    chunk_index: Some(record.payload.chunk_index),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(hits)
    }

    async fn delete_by_source(
        &self,
        collection: &str,
        source: &str,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        if let Some(target) = collections.get_mut(collection) {
            target.records.retain(|_, r| r.payload.source != source);
        }
        Ok(())
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkPayload;

    fn payload(text: &str, source: &str) -> ChunkPayload {
        ChunkPayload::new(text, source, 0)
    }

    #[tokio::test]
    async fn test_empty_collection_search_is_empty() {
        let store = MemoryBackend::new();
        store.reset_collection("kb", 3).await.unwrap();

        let hits = store.search("kb", vec![1.0, 0.0, 0.0], 3, 0.0).await.unwrap();
        assert!(hits.is_empty());

        let missing = store.search("absent", vec![1.0, 0.0, 0.0], 3, 0.0).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_create_then_search_same_vector() {
        let store = MemoryBackend::new();
        store.ensure_collection("kb", 3).await.unwrap();
        let id = store
            .create("kb", vec![0.2, 0.4, 0.6], payload("hello", "a.txt"))
            .await
            .unwrap();

        let hits = store.search("kb", vec![0.2, 0.4, 0.6], 3, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].original_text.as_deref(), Some("hello"));
        assert_eq!(hits[0].source.as_deref(), Some("a.txt"));
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_search_orders_filters_and_limits() {
        let store = MemoryBackend::new();
        store.ensure_collection("kb", 2).await.unwrap();
        store.create("kb", vec![1.0, 0.0], payload("exact", "a.txt")).await.unwrap();
        store.create("kb", vec![1.0, 1.0], payload("close", "a.txt")).await.unwrap();
        store.create("kb", vec![0.0, 1.0], payload("orthogonal", "a.txt")).await.unwrap();

        let hits = store.search("kb", vec![1.0, 0.0], 10, 0.5).await.unwrap();
        let texts: Vec<_> = hits.iter().filter_map(|h| h.original_text.as_deref()).collect();
        assert_eq!(texts, vec!["exact", "close"]);

        let limited = store.search("kb", vec![1.0, 0.0], 1, 0.0).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].original_text.as_deref(), Some("exact"));
    }

    #[tokio::test]
    async fn test_ensure_collection_preserves_records() {
        let store = MemoryBackend::new();
        store.ensure_collection("kb", 2).await.unwrap();
        store.create("kb", vec![1.0, 0.0], payload("kept", "a.txt")).await.unwrap();

        store.ensure_collection("kb", 2).await.unwrap();
        assert_eq!(store.count("kb").await.unwrap(), 1);

        let err = store.ensure_collection("kb", 3).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::CollectionError(_)));
    }

    #[tokio::test]
    async fn test_reset_and_delete_collection() {
        let store = MemoryBackend::new();
        store.ensure_collection("kb", 2).await.unwrap();
        store.create("kb", vec![1.0, 0.0], payload("gone", "a.txt")).await.unwrap();

        store.reset_collection("kb", 2).await.unwrap();
        assert_eq!(store.count("kb").await.unwrap(), 0);

        assert!(store.delete_collection("kb").await.unwrap());
        assert!(!store.delete_collection("kb").await.unwrap());
        assert!(store.collection_info("kb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let store = MemoryBackend::new();
        store.ensure_collection("kb", 2).await.unwrap();
        store.create("kb", vec![1.0, 0.0], payload("a1", "a.txt")).await.unwrap();
        store.create("kb", vec![0.0, 1.0], payload("b1", "b.txt")).await.unwrap();

        store.delete_by_source("kb", "a.txt").await.unwrap();
        let hits = store.search("kb", vec![1.0, 1.0], 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source.as_deref(), Some("b.txt"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension_and_missing_collection() {
        let store = MemoryBackend::new();
        let err = store
            .create("absent", vec![1.0], payload("x", "a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::UpsertError(_)));

        store.ensure_collection("kb", 2).await.unwrap();
        let err = store
            .create("kb", vec![1.0, 0.0, 0.0], payload("x", "a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::UpsertError(_)));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]).unwrap() - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-9);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_none());
    }
}
