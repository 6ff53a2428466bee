use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TaskId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub agent: String,
    pub payload: Value,
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    pub fn new(agent: impl Into<String>, payload: Value) -> Self {
        Self {
            id: TaskId::new_v4(),
            agent: agent.into(),
            payload,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded { output: Value },
    Failed { error: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

/// One entry of an agent's execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub finished_at: DateTime<Utc>,
    pub outcome: TaskOutcome,
}
