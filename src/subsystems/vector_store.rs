use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use pgvector::Vector;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{InitOutcome, Subsystem};

/// pgvector-backed embedding index for ingested documents.
pub struct VectorStore {
    url: Option<String>,
    dimension: usize,
    acquire_timeout: Duration,
    pool: RwLock<Option<PgPool>>,
}

impl VectorStore {
    pub fn new(url: Option<String>, dimension: usize) -> Self {
        Self {
            url,
            dimension,
            acquire_timeout: Duration::from_secs(5),
            pool: RwLock::new(None),
        }
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.pool.read().is_some()
    }

    pub async fn upsert(&self, id: Uuid, embedding: &[f32], metadata: Value) -> Result<()> {
        self.check_dimension(embedding)?;
        let pool = self.ready_pool()?;

        sqlx::query(
            r#"
            INSERT INTO document_embeddings (id, embedding, metadata)
            VALUES ($1, $2, $3)
            ON CONFLICT (id)
            DO UPDATE SET embedding = EXCLUDED.embedding, metadata = EXCLUDED.metadata
            "#,
        )
        .bind(id)
        .bind(Vector::from(embedding.to_vec()))
        .bind(metadata)
        .execute(&pool)
        .await?;
        Ok(())
    }

    /// Closest documents by cosine similarity, best first.
    pub async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<(Uuid, f64)>> {
        self.check_dimension(embedding)?;
        let pool = self.ready_pool()?;

        let rows = sqlx::query(
            r#"
            SELECT id, 1 - (embedding <=> $1::vector) AS similarity
            FROM document_embeddings
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(Uuid, f64)> {
                Ok((row.try_get("id")?, row.try_get("similarity")?))
            })
            .collect()
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        ensure!(
            embedding.len() == self.dimension,
            "embedding dimension {} does not match index dimension {}",
            embedding.len(),
            self.dimension
        );
        Ok(())
    }

    fn ready_pool(&self) -> Result<PgPool> {
        self.pool
            .read()
            .clone()
            .ok_or_else(|| anyhow!("vector store is not initialized"))
    }

    async fn connect(&self, url: &str) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(self.acquire_timeout)
            .connect(url)
            .await
            .context("failed to connect to vector database")?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await
            .context("pgvector extension unavailable")?;

        // The dimension is a usize, so formatting it into DDL is safe.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS document_embeddings (
                id UUID PRIMARY KEY,
                embedding vector({}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.dimension
        ))
        .execute(&pool)
        .await
        .context("failed to prepare document_embeddings table")?;

        Ok(pool)
    }
}

#[async_trait]
impl Subsystem for VectorStore {
    async fn initialize(&self) -> InitOutcome {
        let Some(url) = self.url.as_deref() else {
            return InitOutcome::Degraded("vector database url not configured".to_string());
        };

        match self.connect(url).await {
            Ok(pool) => {
                *self.pool.write() = Some(pool);
                info!(dimension = self.dimension, "Vector store ready");
                InitOutcome::Ready
            }
            Err(e) => InitOutcome::degraded(&e),
        }
    }

    async fn close(&self) -> Result<()> {
        let pool = self.pool.write().take();
        match pool {
            Some(pool) => {
                pool.close().await;
                info!("Vector store closed");
            }
            None => debug!("Vector store was never opened"),
        }
        Ok(())
    }
}
