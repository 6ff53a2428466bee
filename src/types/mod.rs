pub mod health;
pub mod task;

pub use health::{AgentStatus, HealthSnapshot, HealthStatus, PoolStats, PoolStatus, UnhealthyReport};
pub use task::{Task, TaskOutcome, TaskRecord};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemKind {
    Persistence,
    VectorIndex,
    AgentPool,
}

impl SubsystemKind {
    /// Startup order. Teardown walks it backwards.
    pub const STARTUP_ORDER: [SubsystemKind; 3] = [
        SubsystemKind::Persistence,
        SubsystemKind::VectorIndex,
        SubsystemKind::AgentPool,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            SubsystemKind::Persistence => "persistence",
            SubsystemKind::VectorIndex => "vector_index",
            SubsystemKind::AgentPool => "agent_pool",
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SubsystemState {
    Uninitialized,
    Ready,
    Degraded(String),
}

impl SubsystemState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SubsystemState::Ready)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SubsystemState::Degraded(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubsystemState::Uninitialized => "uninitialized",
            SubsystemState::Ready => "ready",
            SubsystemState::Degraded(_) => "degraded",
        }
    }
}
