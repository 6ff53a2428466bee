//! Health snapshot aggregation.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::agents::AgentPool;
use crate::types::HealthSnapshot;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("{0}")]
    Query(String),
    #[error("agent pool status query timed out after {0:?}")]
    Timeout(Duration),
}

/// Builds a fresh snapshot from the agent pool on every call. Nothing is
/// cached, so two snapshots may disagree while tasks are moving.
pub struct HealthAggregator {
    pool: Arc<dyn AgentPool>,
    query_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(pool: Arc<dyn AgentPool>, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub async fn snapshot(&self) -> Result<HealthSnapshot, HealthError> {
        match timeout(self.query_timeout, self.pool.status()).await {
            Ok(Ok(status)) => Ok(HealthSnapshot::healthy(status)),
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                if message.is_empty() {
                    Err(HealthError::Query("agent pool status query failed".to_string()))
                } else {
                    Err(HealthError::Query(message))
                }
            }
            Err(_) => Err(HealthError::Timeout(self.query_timeout)),
        }
    }
}
