//! PostgreSQL + pgvector backend.
//!
//! Each collection is its own table holding the vector, the chunk payload
//! columns and an HNSW cosine index. The dimension is fixed by the column type.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;
use tracing::debug;

use super::{VectorStore, dimension_mismatch};
use crate::error::VectorStoreError;
use crate::models::{CollectionInfo, SearchResult, VectorDriver, VectorRecord, VectorStoreConfig};

/// One table per collection, optionally inside a dedicated schema.
pub struct PgVectorBackend {
    pool: PgPool,
    schema: Option<String>,
}

impl PgVectorBackend {
    pub async fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::StoreUnavailable(e.to_string()))?;

        let schema = config
            .schema
            .as_deref()
            .map(|s| validate_identifier(s).map(str::to_string))
            .transpose()?;

        let backend = Self { pool, schema };

        backend.check_pgvector_extension().await?;

        if let Some(ref schema) = backend.schema {
            backend.ensure_schema(schema).await?;
        }

        Ok(backend)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(pg_error)?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn ensure_schema(&self, schema: &str) -> Result<(), VectorStoreError> {
        let query = format!("CREATE SCHEMA IF NOT EXISTS {}", schema);
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(pg_error)?;
        Ok(())
    }

    fn table_name(&self, collection: &str) -> Result<String, VectorStoreError> {
        let collection = validate_identifier(collection)?;
        Ok(match &self.schema {
            Some(schema) => format!("{}.{}", schema, collection),
            None => collection.to_string(),
        })
    }

    async fn table_exists(&self, table: &str) -> Result<bool, VectorStoreError> {
        let row: (bool,) = sqlx::query_as("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(pg_error)?;
        Ok(row.0)
    }

    async fn create_table(&self, collection: &str, dimension: u64) -> Result<(), VectorStoreError> {
        let table = self.table_name(collection)?;
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                original_text TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index BIGINT NOT NULL,
                ingested_at TEXT NOT NULL,
                embedding vector({}) NOT NULL
            )
            "#,
            table, dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let indices = [
            format!(
                "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding vector_cosine_ops)",
                collection, table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_source_idx ON {} (source)",
                collection, table
            ),
        ];

        for index_sql in &indices {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        }

        debug!(collection, dimension, "created pgvector table");
        Ok(())
    }
}

/// Collection and schema names are spliced into SQL, so only plain
/// identifiers are accepted.
fn validate_identifier(name: &str) -> Result<&str, VectorStoreError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 48;

    if valid {
        Ok(name)
    } else {
        Err(VectorStoreError::CollectionError(format!(
            "invalid collection name for PostgreSQL: '{}'",
            name
        )))
    }
}

fn pg_error(e: sqlx::Error) -> VectorStoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            VectorStoreError::StoreUnavailable(e.to_string())
        }
        other => VectorStoreError::PostgresError(other.to_string()),
    }
}

#[async_trait]
impl VectorStore for PgVectorBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::StoreUnavailable(e.to_string()))
    }

    async fn collection_info(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let table = self.table_name(collection)?;
        if !self.table_exists(&table).await? {
            return Ok(None);
        }

        // For the vector type, atttypmod holds the declared dimension.
        let (dimension,): (i32,) = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute WHERE attrelid = to_regclass($1) AND attname = 'embedding'",
        )
        .bind(&table)
        .fetch_one(&self.pool)
        .await
        .map_err(pg_error)?;

        let query = format!("SELECT COUNT(*) as count FROM {}", table);
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(pg_error)?;

        Ok(Some(CollectionInfo {
            points_count: count.max(0) as u64,
            dimension: dimension.max(0) as u64,
        }))
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
            None => self.create_table(collection, dimension).await,
        }
    }

    async fn reset_collection(
        &self,
        collection: &str,
        dimension: u64,
    ) -> Result<(), VectorStoreError> {
        self.delete_collection(collection).await?;
        self.create_table(collection, dimension).await
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
        let table = self.table_name(collection)?;
        if !self.table_exists(&table).await? {
            return Ok(false);
        }

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

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

        let query = format!(
            r#"
            INSERT INTO {} (id, original_text, source, chunk_index, ingested_at, embedding)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                original_text = EXCLUDED.original_text,
                source = EXCLUDED.source,
                chunk_index = EXCLUDED.chunk_index,
                ingested_at = EXCLUDED.ingested_at,
                embedding = EXCLUDED.embedding
            "#,
            self.table_name(collection)?
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        for record in records {
            let id = uuid::Uuid::parse_str(&record.id)
                .map_err(|e| VectorStoreError::UpsertError(format!("Invalid UUID: {}", e)))?;

            sqlx::query(&query)
                .bind(id)
                .bind(&record.payload.original_text)
                .bind(&record.payload.source)
                .bind(i64::try_from(record.payload.chunk_index).unwrap_or(i64::MAX))
                .bind(&record.payload.ingested_at)
                .bind(Vector::from(record.vector))
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let table = self.table_name(collection)?;
        if !self.table_exists(&table).await? {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
            SELECT
                id::text AS id,
                (1 - (embedding <=> $1))::float8 AS score,
                original_text,
                source,
                chunk_index
            FROM {}
            WHERE (1 - (embedding <=> $1)) >= $2
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
            table
        );

        let rows = sqlx::query(&query)
            .bind(Vector::from(query_vector))
            .bind(f64::from(score_threshold))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        let results = rows
            .into_iter()
            .map(|row: PgRow| {
                let score: f64 = row.get("score");
                let chunk_index: i64 = row.get("chunk_index");
                SearchResult {
                    id: row.get("id"),
                    score: score as f32,
                    original_text: row.get("original_text"),
                    source: row.get("source"),
                    chunk_index: u64::try_from(chunk_index).ok(),
                }
            })
            .collect();

        Ok(results)
    }

    async fn delete_by_source(
        &self,
        collection: &str,
        source: &str,
    ) -> Result<(), VectorStoreError> {
        let table = self.table_name(collection)?;
        if !self.table_exists(&table).await? {
            return Ok(());
        }

        sqlx::query(&format!("DELETE FROM {} WHERE source = $1", table))
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        Ok(())
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::PostgreSQL
    }
}
