pub mod database;
pub mod vector_store;

pub use database::Database;
pub use vector_store::VectorStore;

use anyhow::Result;
use async_trait::async_trait;

/// Result of bringing a subsystem up. A degraded subsystem keeps the process
/// alive with reduced capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    Degraded(String),
}

impl InitOutcome {
    pub fn degraded(error: &anyhow::Error) -> Self {
        InitOutcome::Degraded(format!("{:#}", error))
    }
}

/// An independently optional dependency of the service.
#[async_trait]
pub trait Subsystem: Send + Sync {
    async fn initialize(&self) -> InitOutcome;

    /// Must be safe to call on a handle that never became ready.
    async fn close(&self) -> Result<()>;
}
