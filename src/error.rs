//! Error types for the PDF RAG pipeline.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to PDF text extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to parse PDF {path}: {reason}")]
    ParseError { path: String, reason: String },

    #[error("extraction IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ModelUnavailable(_) | EmbeddingError::Timeout => true,
            // 5xx and 429 from the server are usually transient
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::TokenizerError(_)
            | EmbeddingError::InferenceError(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::StoreUnavailable(_) => true,
            VectorStoreError::PgVectorExtensionError(_) => false,
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::SearchError(msg)
            | VectorStoreError::DeleteError(msg)
            | VectorStoreError::PostgresError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
        }
    }
}

/// Errors related to ingesting a document into the vector store.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("chunk load error: {0}")]
    Load(#[from] std::io::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    /// Ingestion stopped part-way; the chunks already stored are not rolled back.
    #[error("ingestion of {document} stopped after {chunks_stored} stored chunk(s): {cause}")]
    Interrupted {
        document: String,
        chunks_stored: u64,
        cause: Box<IngestError>,
    },
}

impl IngestError {
    /// Number of chunks that made it into the store before the failure.
    pub fn chunks_stored(&self) -> u64 {
        match self {
            IngestError::Interrupted { chunks_stored, .. } => *chunks_stored,
            _ => 0,
        }
    }
}

impl Retryable for IngestError {
    fn is_retryable(&self) -> bool {
        match self {
            IngestError::Extract(_) => false,
            IngestError::Load(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            ),
            IngestError::Embedding(e) => e.is_retryable(),
            IngestError::VectorStore(e) => e.is_retryable(),
            IngestError::Interrupted { cause, .. } => cause.is_retryable(),
        }
    }
}

/// Errors related to search and retrieval.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors related to text generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("model '{model}' is not allowed (allowed: {allowed})")]
    ModelNotAllowed { model: String, allowed: String },

    #[error("generation server error: {0}")]
    ServerError(String),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation timeout")]
    Timeout,
}

/// Errors related to the ingestion job ledger and runner.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("job ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job id prefix '{0}' matches more than one job")]
    AmbiguousId(String),

    #[error("job {id} cannot be retried while {status}")]
    NotRetryable { id: String, status: String },

    #[error("job queue is closed")]
    QueueClosed,

    #[error("job ledger lock poisoned")]
    LockPoisoned,
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("job error: {0}")]
    Job(#[from] JobError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryable() {
        assert!(EmbeddingError::ModelUnavailable("refused".into()).is_retryable());
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ServerError("status 503: busy".into()).is_retryable());
        assert!(!EmbeddingError::ServerError("status 400: bad input".into()).is_retryable());
        assert!(!EmbeddingError::InvalidResponse("empty".into()).is_retryable());
    }

    #[test]
    fn test_ingest_error_retryable_follows_cause() {
        let parse = IngestError::Extract(ExtractError::ParseError {
            path: "a.pdf".into(),
            reason: "bad xref".into(),
        });
        assert!(!parse.is_retryable());

        let interrupted = IngestError::Interrupted {
            document: "a.txt".into(),
            chunks_stored: 4,
            cause: Box::new(IngestError::VectorStore(VectorStoreError::StoreUnavailable(
                "connection refused".into(),
            ))),
        };
        assert!(interrupted.is_retryable());
        assert_eq!(interrupted.chunks_stored(), 4);
    }

    #[test]
    fn test_vector_store_error_retryable() {
        assert!(VectorStoreError::StoreUnavailable("down".into()).is_retryable());
        assert!(VectorStoreError::UpsertError("Connection reset".into()).is_retryable());
        assert!(!VectorStoreError::CollectionError("dimension mismatch".into()).is_retryable());
    }
}
