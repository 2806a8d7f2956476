//! Query-time retrieval of document context for a prompt.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::embedding::Embedder;
use super::vector_store::VectorStore;
use crate::context::AppContext;
use crate::error::SearchError;
use crate::models::{RetrievalConfig, SearchQuery, SearchResult, SearchResults};
use crate::utils::clean;

pub struct RagRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl RagRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        Self::new(
            Arc::clone(&ctx.embedder),
            Arc::clone(&ctx.store),
            ctx.config.retrieval.clone(),
        )
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Context text for `prompt`: the stored text of the best matches,
    /// one per line. Returns an empty string when nothing qualifies or when
    /// retrieval fails; failures are logged.
    pub async fn get_rag_content(&self, prompt: &str) -> String {
        match self.try_get_rag_content(prompt).await {
            Ok(content) => content,
            Err(e) => {
                warn!("retrieval failed, continuing without context: {e}");
                String::new()
            }
        }
    }

    /// Like [`get_rag_content`](Self::get_rag_content), but surfaces failures.
    pub async fn try_get_rag_content(&self, prompt: &str) -> Result<String, SearchError> {
        let results = self.retrieve(prompt).await?;
        Ok(join_results(&results))
    }

    /// Matches for `prompt` above the configured threshold, best first.
    pub async fn retrieve(&self, prompt: &str) -> Result<Vec<SearchResult>, SearchError> {
        let cleaned = clean(prompt);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(&cleaned).await?;
        let results = self
            .store
            .search(
                &self.config.collection,
                vector,
                self.config.limit,
                self.config.score_threshold,
            )
            .await?;

        debug!(
            collection = %self.config.collection,
            hits = results.len(),
            "retrieved context"
        );
        Ok(results)
    }

    /// Search with an explicit collection, limit and threshold.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults, SearchError> {
        let start = Instant::now();
        let cleaned = clean(&query.query);
        if cleaned.is_empty() {
            return Err(SearchError::InvalidQuery("query cannot be empty".to_string()));
        }

        let vector = self.embedder.embed(&cleaned).await?;
        let results = self
            .store
            .search(&query.collection, vector, query.limit, query.min_score)
            .await?;

        Ok(SearchResults::new(
            query.query.clone(),
            query.collection.clone(),
            results,
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Join the stored text of `results` with newlines, skipping records
/// without text.
pub fn join_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .filter_map(|r| r.original_text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The prompt sent to the model: the user prompt followed by the context.
pub fn augment_prompt(prompt: &str, rag_content: &str) -> String {
    if rag_content.is_empty() {
        prompt.to_string()
    } else {
        format!("{} {}", prompt, rag_content)
    }
}
