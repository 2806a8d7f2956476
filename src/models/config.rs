use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8080";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "knowledgebase";
pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_RETRIEVAL_LIMIT: u64 = 3;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_GENERATION_URL: &str = "http://localhost:11434";
pub const DEFAULT_GENERATION_MODEL: &str = "tinyllama:latest";

const APP_DIR: &str = "pdfrag";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question. \
When context from the user's documents is appended to the question, prefer it over prior \
knowledge and say so when the context does not contain the answer.";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join(APP_DIR))
    }

    /// Location of the SQLite ingestion job ledger.
    pub fn jobs_db_path(&self) -> Option<PathBuf> {
        self.jobs
            .db_path
            .clone()
            .or_else(|| Self::data_dir().map(|d| d.join("jobs.db")))
    }

    /// Load configuration: `.env`, then the config file, then `PDFRAG_*` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Apply `PDFRAG_*` overrides; `lookup` resolves a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PDFRAG_EMBEDDING_URL") {
            self.embedding.url = url;
        }
        if let Some(driver) = lookup("PDFRAG_VECTOR_DRIVER")
            && let Ok(driver) = driver.parse()
        {
            self.vector_store.driver = driver;
        }
        if let Some(url) = lookup("PDFRAG_VECTOR_URL") {
            self.vector_store.url = url;
        }
        if let Some(key) = lookup("PDFRAG_VECTOR_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Some(collection) = lookup("PDFRAG_COLLECTION") {
            self.ingest.collection = collection.clone();
            self.retrieval.collection = collection;
        }
        if let Some(url) = lookup("PDFRAG_GENERATION_URL") {
            self.generation.url = url;
        }
        if let Some(model) = lookup("PDFRAG_GENERATION_MODEL") {
            self.generation.model = model;
        }
        if let Some(key) = lookup("PDFRAG_GENERATION_API_KEY") {
            self.generation.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }
        if self.ingest.chunk_size < 4 {
            return Err(ConfigError::ValidationError(
                "ingest.chunk_size must be at least 4 bytes".to_string(),
            ));
        }
        if self.retrieval.limit == 0 || self.search.default_limit == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.limit and search.default_limit must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.score_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.ingest.collection.trim().is_empty() || self.retrieval.collection.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "collection names cannot be empty".to_string(),
            ));
        }
        if !self.generation.allowed_models.is_empty()
            && !self
                .generation
                .allowed_models
                .iter()
                .any(|m| m == &self.generation.model)
        {
            return Err(ConfigError::ValidationError(format!(
                "generation.model '{}' is not in generation.allowed_models",
                self.generation.model
            )));
        }
        Ok(())
    }
}

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// text-embeddings-inference compatible HTTP server
    #[default]
    Http,
    /// Local ONNX model loaded in-process
    Onnx,
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Http => write!(f, "http"),
            EmbeddingProvider::Onnx => write!(f, "onnx"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Directory holding `model.onnx` and `tokenizer.json` for the ONNX provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    8
}

fn default_max_tokens() -> u32 {
    512
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            url: default_embedding_url(),
            model_path: None,
            dimension: default_dimension(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Which vector database backs the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Qdrant,
    #[serde(alias = "postgres", alias = "pgvector")]
    PostgreSQL,
    /// In-process store; contents are lost when the process exits.
    Memory,
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::PostgreSQL => write!(f, "postgresql"),
            VectorDriver::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for VectorDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(VectorDriver::Qdrant),
            "postgresql" | "postgres" | "pgvector" => Ok(VectorDriver::PostgreSQL),
            "memory" => Ok(VectorDriver::Memory),
            _ => Err(format!("unknown vector driver: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// PostgreSQL schema holding one table per collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_pool_max() -> u32 {
    5
}

fn default_pool_acquire_timeout() -> u32 {
    10
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            api_key: None,
            schema: None,
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Bytes of extracted text per embedded chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()]
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            chunk_size: default_chunk_size(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_retrieval_limit")]
    pub limit: u64,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

fn default_retrieval_limit() -> u64 {
    DEFAULT_RETRIEVAL_LIMIT
}

fn default_score_threshold() -> f32 {
    DEFAULT_SCORE_THRESHOLD
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            limit: default_retrieval_limit(),
            score_threshold: default_score_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default)]
    pub default_format: OutputFormat,

    #[serde(default)]
    pub default_min_score: Option<f32>,
}

fn default_limit() -> u32 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_format: OutputFormat::Text,
            default_min_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_url")]
    pub url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Empty means any model is accepted.
    #[serde(default)]
    pub allowed_models: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_generation_url() -> String {
    DEFAULT_GENERATION_URL.to_string()
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.01
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_generation_model(),
            api_key: None,
            allowed_models: Vec::new(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Overrides the default `<data dir>/pdfrag/jobs.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_attempts: default_max_attempts(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}
