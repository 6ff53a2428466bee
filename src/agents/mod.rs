pub mod controller;

pub use controller::{AgentController, PoolError};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::subsystems::Subsystem;
use crate::types::{PoolStatus, Task};

/// A worker agent. How it reasons is its own business; the pool only
/// schedules it and records what happened.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn tools(&self) -> Vec<String> {
        Vec::new()
    }

    async fn execute(&self, task: &Task) -> Result<Value>;
}

/// The agent-execution pool as seen by the lifecycle and health layers.
#[async_trait]
pub trait AgentPool: Subsystem {
    /// Point-in-time counters and per-agent states.
    async fn status(&self) -> Result<PoolStatus>;

    /// Pulls queued work and dispatches it until `shutdown` is cancelled.
    async fn process_tasks(&self, shutdown: CancellationToken) -> Result<()>;
}
