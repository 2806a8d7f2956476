mod config;
mod document;
mod job;
mod search;

pub use config::{
    Config, DEFAULT_CHUNK_SIZE, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_URL, DEFAULT_GENERATION_MODEL, DEFAULT_GENERATION_URL, DEFAULT_QDRANT_URL,
    DEFAULT_RETRIEVAL_LIMIT, DEFAULT_SCORE_THRESHOLD, EmbeddingConfig, EmbeddingProvider,
    GenerationConfig, IngestConfig, JobsConfig, RetrievalConfig, SearchConfig, VectorDriver,
    VectorStoreConfig,
};
pub use document::{ChunkPayload, CollectionInfo, IngestReport, VectorRecord};
pub use job::{IngestJob, JobEvent, JobStatus};
pub use search::{OutputFormat, SearchQuery, SearchResult, SearchResults};
