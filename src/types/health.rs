use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Per-agent view owned by the agent pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub tools_count: usize,
    pub history_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub completed_tasks: usize,
    pub max_concurrent: usize,
}

/// What the agent pool reports when asked for its status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub agents: BTreeMap<String, AgentStatus>,
    pub stats: PoolStats,
}

/// Body of a successful `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub agents: BTreeMap<String, AgentStatus>,
    pub stats: PoolStats,
}

impl HealthSnapshot {
    pub fn healthy(pool: PoolStatus) -> Self {
        Self {
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            agents: pool.agents,
            stats: pool.stats,
        }
    }
}

/// Body of a failed `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnhealthyReport {
    pub status: HealthStatus,
    pub error: String,
}

impl UnhealthyReport {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error: error.into(),
        }
    }
}
