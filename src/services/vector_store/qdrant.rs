//! Qdrant vector store backend implementation.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use std::collections::HashMap;
use tracing::debug;

use super::{VectorStore, dimension_mismatch};
use crate::error::VectorStoreError;
use crate::models::{CollectionInfo, SearchResult, VectorDriver, VectorRecord, VectorStoreConfig};

/// Qdrant vector store backend.
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::StoreUnavailable(e.to_string()))?;

        Ok(Self { client })
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(|e| classify(e, VectorStoreError::CollectionError))
    }

    async fn create_collection(&self, collection: &str, dimension: u64) -> Result<(), VectorStoreError> {
        let create_collection = CreateCollectionBuilder::new(collection)
            .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| classify(e, VectorStoreError::CollectionError))?;

        debug!(collection, dimension, "created qdrant collection");
        Ok(())
    }
}

fn is_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not found") || lower.contains("doesn't exist")
}

/// Transport-level failures become `StoreUnavailable`; everything else
/// keeps the operation-specific variant.
fn classify(
    error: qdrant_client::QdrantError,
    variant: fn(String) -> VectorStoreError,
) -> VectorStoreError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("transport error")
        || lower.contains("connection refused")
        || lower.contains("unavailable")
        || lower.contains("deadline")
    {
        VectorStoreError::StoreUnavailable(message)
    } else {
        variant(message)
    }
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| match &v.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    })
}

fn payload_u64(payload: &HashMap<String, Value>, key: &str) -> Option<u64> {
    payload.get(key).and_then(|v| match &v.kind {
        Some(Kind::IntegerValue(n)) => u64::try_from(*n).ok(),
        _ => None,
    })
}

fn point_id_string(id: Option<&PointId>) -> String {
    match id.and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn to_point(record: VectorRecord) -> PointStruct {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert("original_text".to_string(), record.payload.original_text.into());
    payload.insert("source".to_string(), record.payload.source.into());
    payload.insert(
        "chunk_index".to_string(),
        i64::try_from(record.payload.chunk_index).unwrap_or(i64::MAX).into(),
    );
    payload.insert("ingested_at".to_string(), record.payload.ingested_at.into());

    PointStruct::new(record.id, record.vector, payload)
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::StoreUnavailable(e.to_string()))
    }

    async fn collection_info(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        match self.client.collection_info(collection).await {
            Ok(response) => {
                let Some(info) = response.result else {
                    return Ok(None);
                };
                let dimension = info
                    .config
                    .and_then(|c| c.params)
                    .and_then(|p| p.vectors_config)
                    .and_then(|v| v.config)
                    .map_or(0, |config| match config {
                        VectorsConfigKind::Params(params) => params.size,
                        VectorsConfigKind::ParamsMap(_) => 0,
                    });
                Ok(Some(CollectionInfo {
                    points_count: info.points_count.unwrap_or(0),
                    dimension,
                }))
            }
            Err(e) if is_not_found(&e.to_string()) => Ok(None),
            Err(e) => Err(classify(e, VectorStoreError::CollectionError)),
        }
    }

    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: u64,
    ) -> Result<(), VectorStoreError> {
        match self.collection_info(collection).await? {
            Some(info) if info.dimension != dimension => {
                Err(dimension_mismatch(collection, info.dimension, dimension))
            }
            Some(_) => Ok(()),
            None => self.create_collection(collection, dimension).await,
        }
    }

    async fn reset_collection(
        &self,
        collection: &str,
        dimension: u64,
    ) -> Result<(), VectorStoreError> {
        self.delete_collection(collection).await?;
        self.create_collection(collection, dimension).await
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
        if !self.collection_exists(collection).await? {
            return Ok(false);
        }

        self.client
            .delete_collection(collection)
            .await
            .map_err(|e| classify(e, VectorStoreError::DeleteError))?;

        debug!(collection, "deleted qdrant collection");
        Ok(true)
    }

    async fn upsert(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records.into_iter().map(to_point).collect();
        let upsert = UpsertPointsBuilder::new(collection, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| classify(e, VectorStoreError::UpsertError))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let search = SearchPointsBuilder::new(collection, query_vector, limit)
            .with_payload(true)
            .score_threshold(score_threshold);

        let response = match self.client.search_points(search).await {
            Ok(response) => response,
            Err(e) if is_not_found(&e.to_string()) => return Ok(Vec::new()),
            Err(e) => return Err(classify(e, VectorStoreError::SearchError)),
        };

        let results = response
            .result
            .into_iter()
            .map(|point| SearchResult {
                id: point_id_string(point.id.as_ref()),
                score: point.score,
                original_text: payload_string(&point.payload, "original_text"),
                source: payload_string(&point.payload, "source"),
                chunk_index: payload_u64(&point.payload, "chunk_index"),
            })
            .collect();

        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<u64, VectorStoreError> {
        match self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
        {
            Ok(response) => Ok(response.result.map_or(0, |r| r.count)),
            Err(e) if is_not_found(&e.to_string()) => Ok(0),
            Err(e) => Err(classify(e, VectorStoreError::CollectionError)),
        }
    }

    async fn delete_by_source(
        &self,
        collection: &str,
        source: &str,
    ) -> Result<(), VectorStoreError> {
        let filter = Filter::must([Condition::matches("source", source.to_string())]);
        let delete = DeletePointsBuilder::new(collection).points(filter).wait(true);

        match self.client.delete_points(delete).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e.to_string()) => Ok(()),
            Err(e) => Err(classify(e, VectorStoreError::DeleteError)),
        }
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Qdrant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkPayload;

    #[test]
    fn test_backend_creation_is_lazy() {
        // Building the client does not connect.
        let config = VectorStoreConfig {
            url: "http://127.0.0.1:6334".to_string(),
            ..Default::default()
        };
        assert!(QdrantBackend::new(&config).is_ok());
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found("Not found: Collection `kb` doesn't exist!"));
        assert!(!is_not_found("status: Internal"));
    }

    #[test]
    fn test_to_point_payload() {
        let record = VectorRecord::new(vec![0.1, 0.2], ChunkPayload::new("hello", "a.txt", 7));
        let id = record.id.clone();
        let point = to_point(record);

        assert_eq!(point_id_string(point.id.as_ref()), id);
        assert_eq!(
            payload_string(&point.payload, "original_text").as_deref(),
            Some("hello")
        );
        assert_eq!(payload_string(&point.payload, "source").as_deref(), Some("a.txt"));
        assert_eq!(payload_u64(&point.payload, "chunk_index"), Some(7));
    }
}
