use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Agent, AgentPool};
use crate::subsystems::{InitOutcome, Subsystem};
use crate::types::{AgentStatus, PoolStats, PoolStatus, Task, TaskId, TaskOutcome, TaskRecord};

const MAX_HISTORY: usize = 100;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("agent pool is not initialized")]
    NotInitialized,
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("agent already registered: {0}")]
    DuplicateAgent(String),
}

struct AgentSlot {
    agent: Arc<dyn Agent>,
    created_at: DateTime<Utc>,
    in_flight: usize,
    history: VecDeque<TaskRecord>,
}

impl AgentSlot {
    fn status(&self) -> AgentStatus {
        let state = if self.in_flight > 0 { "running" } else { "idle" };
        AgentStatus {
            state: Some(state.to_string()),
            tools_count: self.agent.tools().len(),
            history_count: self.history.len(),
            created_at: self.created_at,
        }
    }
}

struct Inner {
    max_concurrent: usize,
    permits: Arc<Semaphore>,
    agents: RwLock<BTreeMap<String, AgentSlot>>,
    queue: Mutex<VecDeque<Task>>,
    queued: Notify,
    active: AtomicUsize,
    completed: AtomicUsize,
    initialized: AtomicBool,
}

impl Inner {
    async fn next_task(&self) -> Task {
        loop {
            if let Some(task) = self.queue.lock().pop_front() {
                return task;
            }
            self.queued.notified().await;
        }
    }

    async fn run_task(&self, task: Task, in_flight: InFlight) {
        let agent = self.agents.read().get(&task.agent).map(|slot| slot.agent.clone());

        let outcome = match agent {
            Some(agent) => match agent.execute(&task).await {
                Ok(output) => TaskOutcome::Succeeded { output },
                Err(e) => {
                    warn!(task_id = %task.id, agent = %task.agent, error = %format!("{:#}", e), "Task failed");
                    TaskOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
            },
            None => TaskOutcome::Failed {
                error: format!("unknown agent: {}", task.agent),
            },
        };

        if let Some(slot) = self.agents.write().get_mut(&task.agent) {
            slot.history.push_back(TaskRecord {
                task_id: task.id,
                finished_at: Utc::now(),
                outcome,
            });
            if slot.history.len() > MAX_HISTORY {
                slot.history.pop_front();
            }
        }
        drop(in_flight);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts a task as active from dispatch until it is dropped, so a task that
/// panics or is aborted before it ever runs still releases its counters.
struct InFlight {
    inner: Arc<Inner>,
    agent: String,
    holds_slot: bool,
}

impl InFlight {
    fn enter(inner: &Arc<Inner>, agent: &str) -> Self {
        inner.active.fetch_add(1, Ordering::SeqCst);
        let holds_slot = match inner.agents.write().get_mut(agent) {
            Some(slot) => {
                slot.in_flight += 1;
                true
            }
            None => false,
        };
        Self {
            inner: inner.clone(),
            agent: agent.to_string(),
            holds_slot,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.holds_slot {
            if let Some(slot) = self.inner.agents.write().get_mut(&self.agent) {
                slot.in_flight = slot.in_flight.saturating_sub(1);
            }
        }
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process agent pool: a registry of agents, a FIFO task queue, and an
/// admission limit on concurrently executing tasks.
#[derive(Clone)]
pub struct AgentController {
    inner: Arc<Inner>,
}

impl AgentController {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrent,
                permits: Arc::new(Semaphore::new(max_concurrent)),
                agents: RwLock::new(BTreeMap::new()),
                queue: Mutex::new(VecDeque::new()),
                queued: Notify::new(),
                active: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<(), PoolError> {
        let name = agent.name().to_string();
        let mut agents = self.inner.agents.write();
        if agents.contains_key(&name) {
            return Err(PoolError::DuplicateAgent(name));
        }

        debug!(agent = %name, tools = agent.tools().len(), "Registered agent");
        agents.insert(
            name,
            AgentSlot {
                agent,
                created_at: Utc::now(),
                in_flight: 0,
                history: VecDeque::new(),
            },
        );
        Ok(())
    }

    pub fn submit(&self, agent: &str, payload: Value) -> Result<TaskId, PoolError> {
        if !self.is_initialized() {
            return Err(PoolError::NotInitialized);
        }
        if !self.inner.agents.read().contains_key(agent) {
            return Err(PoolError::UnknownAgent(agent.to_string()));
        }

        let task = Task::new(agent, payload);
        let id = task.id;
        self.inner.queue.lock().push_back(task);
        self.inner.queued.notify_one();

        debug!(task_id = %id, agent, "Task queued");
        Ok(id)
    }

    pub fn history(&self, agent: &str) -> Option<Vec<TaskRecord>> {
        self.inner
            .agents
            .read()
            .get(agent)
            .map(|slot| slot.history.iter().cloned().collect())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Agent task panicked");
        }
    }
}

#[async_trait]
impl Subsystem for AgentController {
    async fn initialize(&self) -> InitOutcome {
        if self.inner.max_concurrent == 0 {
            return InitOutcome::Degraded("max_concurrent must be at least 1".to_string());
        }

        self.inner.initialized.store(true, Ordering::SeqCst);
        let agents = self.inner.agents.read().len();
        if agents == 0 {
            warn!("Agent pool started with no registered agents");
        }
        info!(agents, max_concurrent = self.inner.max_concurrent, "Agent pool ready");
        InitOutcome::Ready
    }

    async fn close(&self) -> Result<()> {
        self.inner.initialized.store(false, Ordering::SeqCst);

        let dropped = {
            let mut queue = self.inner.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            warn!(dropped, "Dropped queued tasks on shutdown");
        }

        info!("Agent pool shut down");
        Ok(())
    }
}

#[async_trait]
impl AgentPool for AgentController {
    async fn status(&self) -> Result<PoolStatus> {
        let agents = if self.is_initialized() {
            self.inner
                .agents
                .read()
                .iter()
                .map(|(name, slot)| (name.clone(), slot.status()))
                .collect()
        } else {
            BTreeMap::new()
        };

        Ok(PoolStatus {
            agents,
            stats: PoolStats {
                active_tasks: self.inner.active.load(Ordering::SeqCst),
                queued_tasks: self.inner.queue.lock().len(),
                completed_tasks: self.inner.completed.load(Ordering::SeqCst),
                max_concurrent: self.inner.max_concurrent,
            },
        })
    }

    async fn process_tasks(&self, shutdown: CancellationToken) -> Result<()> {
        if !self.is_initialized() {
            return Err(PoolError::NotInitialized.into());
        }

        let mut running = JoinSet::new();
        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = self.inner.permits.clone().acquire_owned() => permit?,
            };
            let task = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                task = self.inner.next_task() => task,
            };

            while let Some(result) = running.try_join_next() {
                log_join_result(result);
            }

            debug!(task_id = %task.id, agent = %task.agent, "Dispatching task");
            let in_flight = InFlight::enter(&self.inner, &task.agent);
            let inner = self.inner.clone();
            running.spawn(async move {
                inner.run_task(task, in_flight).await;
                drop(permit);
            });
        }

        if !running.is_empty() {
            info!(in_flight = running.len(), "Waiting for in-flight tasks");
        }
        while let Some(result) = running.join_next().await {
            log_join_result(result);
        }
        Ok(())
    }
}
