use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload stored next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// The raw chunk as read from the text file, before cleaning.
    pub original_text: String,
    /// Basename of the text file the chunk came from.
    pub source: String,
    pub chunk_index: u64,
    /// RFC 3339 timestamp.
    pub ingested_at: String,
}

impl ChunkPayload {
    pub fn new(original_text: impl Into<String>, source: impl Into<String>, chunk_index: u64) -> Self {
        Self {
            original_text: original_text.into(),
            source: source.into(),
            chunk_index,
            ingested_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A vector with its payload, ready to be written to a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl VectorRecord {
    /// New record with a fresh random id.
    pub fn new(vector: Vec<f32>, payload: ChunkPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            payload,
        }
    }
}

/// Outcome of one successful document ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub source: String,
    pub collection: String,
    pub chunks_read: u64,
    pub chunks_stored: u64,
    /// Chunks whose cleaned text was empty.
    pub chunks_skipped: u64,
}

/// Size and shape of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub dimension: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_record_ids_are_unique() {
        let a = VectorRecord::new(vec![1.0], ChunkPayload::new("x", "a.txt", 0));
        let b = VectorRecord::new(vec![1.0], ChunkPayload::new("x", "a.txt", 0));
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_payload_serializes_expected_keys() {
        let payload = ChunkPayload::new("hello", "a.txt", 2);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["original_text"], "hello");
        assert_eq!(json["source"], "a.txt");
        assert_eq!(json["chunk_index"], 2);
        assert!(json["ingested_at"].is_string());
    }
}
