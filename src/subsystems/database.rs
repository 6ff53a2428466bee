use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

use super::{InitOutcome, Subsystem};

/// Postgres persistence handle shared by the feature routers.
pub struct Database {
    url: Option<String>,
    max_connections: u32,
    acquire_timeout: Duration,
    pool: RwLock<Option<PgPool>>,
}

impl Database {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            pool: RwLock::new(None),
        }
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// `None` until `initialize` succeeds, and again after `close`.
    pub fn pool(&self) -> Option<PgPool> {
        self.pool.read().clone()
    }

    async fn connect(&self, url: &str) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(url)
            .await
            .context("failed to connect to database")?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .context("database ping failed")?;

        Ok(pool)
    }
}

#[async_trait]
impl Subsystem for Database {
    async fn initialize(&self) -> InitOutcome {
        let Some(url) = self.url.as_deref() else {
            return InitOutcome::Degraded("database url not configured".to_string());
        };

        match self.connect(url).await {
            Ok(pool) => {
                *self.pool.write() = Some(pool);
                info!(max_connections = self.max_connections, "Database pool ready");
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
                info!("Database pool closed");
            }
            None => debug!("Database pool was never opened"),
        }
        Ok(())
    }
}
