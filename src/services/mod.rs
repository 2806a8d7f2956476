pub mod embedding;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod jobs;
pub mod loader;
pub mod rag;
pub mod runner;
pub mod vector_store;

pub use embedding::{Embedder, HttpEmbedder, OnnxEmbedder, create_embedder};
pub use extractor::extract_pdf_text;
pub use generation::GenerationClient;
pub use ingest::IngestService;
pub use jobs::JobStore;
pub use loader::{ChunkReader, load_chunks};
pub use rag::{RagRetriever, augment_prompt};
pub use runner::IngestRunner;
pub use vector_store::{VectorStore, create_backend};
