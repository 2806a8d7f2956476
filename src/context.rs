//! Shared services built once at startup.

use std::sync::Arc;
use tracing::debug;

use crate::error::AppError;
use crate::models::Config;
use crate::services::embedding::{Embedder, create_embedder};
use crate::services::vector_store::{VectorStore, create_backend};

/// Configuration plus the embedder and vector store every operation uses.
///
/// Cloning is cheap; the backends are shared.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
}

impl AppContext {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            config,
            embedder,
            store,
        }
    }

    /// Build the backends selected by `config`.
    ///
    /// Connecting to PostgreSQL happens here; the HTTP embedder and Qdrant
    /// connect lazily on first use.
    pub async fn from_config(config: Config) -> Result<Self, AppError> {
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let store: Arc<dyn VectorStore> = Arc::from(create_backend(&config.vector_store).await?);

        debug!(
            embedder = %embedder.describe(),
            driver = %store.driver(),
            "application context ready"
        );
        Ok(Self::new(config, embedder, store))
    }

    /// Dimension of new collections: whatever the embedder produces.
    pub fn collection_size(&self) -> u64 {
        self.embedder.dimension() as u64
    }
}
