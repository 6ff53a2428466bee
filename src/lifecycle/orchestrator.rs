//! Service lifecycle orchestration.
//!
//! Brings the subsystems up in a fixed order with per-subsystem failure
//! isolation, launches the task processor once the agent pool is ready, and
//! tears everything down in reverse order under a shutdown deadline.

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::supervisor::{HaltOutcome, TaskSupervisor};
use super::{panic_message, LifecycleSettings};
use crate::agents::AgentPool;
use crate::subsystems::{InitOutcome, Subsystem};
use crate::types::{SubsystemKind, SubsystemState};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("lifecycle already started")]
    AlreadyStarted,
    #[error("lifecycle has been stopped")]
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub subsystems: BTreeMap<SubsystemKind, SubsystemState>,
    pub supervisor_launched: bool,
    /// Shutdown was requested before every subsystem was attempted.
    pub interrupted: bool,
}

impl StartupReport {
    pub fn state(&self, kind: SubsystemKind) -> SubsystemState {
        self.subsystems
            .get(&kind)
            .cloned()
            .unwrap_or(SubsystemState::Uninitialized)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// Subsystems whose `close()` returned cleanly, in teardown order.
    pub closed: Vec<SubsystemKind>,
    pub failures: Vec<(SubsystemKind, String)>,
    /// `None` when this call did no work or the deadline hit before the halt.
    pub supervisor: Option<HaltOutcome>,
    pub deadline_exceeded: bool,
}

#[derive(Debug, Clone)]
struct Record {
    state: SubsystemState,
    attempted: bool,
    closed: bool,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            state: SubsystemState::Uninitialized,
            attempted: false,
            closed: false,
        }
    }
}

pub struct Lifecycle {
    settings: LifecycleSettings,
    subsystems: [(SubsystemKind, Arc<dyn Subsystem>); 3],
    records: Mutex<BTreeMap<SubsystemKind, Record>>,
    agent_pool: Arc<dyn AgentPool>,
    supervisor: TaskSupervisor,
    /// Held for the whole of `start()`, so teardown never races an
    /// initialization step.
    startup: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Lifecycle {
    pub fn new<P>(
        settings: LifecycleSettings,
        persistence: Arc<dyn Subsystem>,
        vector_index: Arc<dyn Subsystem>,
        agent_pool: Arc<P>,
    ) -> Self
    where
        P: AgentPool + 'static,
    {
        let pool_handle: Arc<dyn Subsystem> = agent_pool.clone();
        let records = SubsystemKind::STARTUP_ORDER
            .iter()
            .map(|kind| (*kind, Record::default()))
            .collect();

        Self {
            settings,
            subsystems: [
                (SubsystemKind::Persistence, persistence),
                (SubsystemKind::VectorIndex, vector_index),
                (SubsystemKind::AgentPool, pool_handle),
            ],
            records: Mutex::new(records),
            agent_pool,
            supervisor: TaskSupervisor::new(),
            startup: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Initializes persistence, the vector index, and the agent pool, in that
    /// order. Subsystem failures are recorded as degraded and never abort
    /// startup.
    pub async fn start(&self) -> Result<StartupReport, LifecycleError> {
        let _startup = self.startup.lock().await;
        if self.stopped.load(Ordering::SeqCst) {
            return Err(LifecycleError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyStarted);
        }

        info!("Starting subsystems");
        let step = self.settings.startup_step_timeout;
        let mut interrupted = false;

        for (kind, subsystem) in &self.subsystems {
            if self.shutdown.is_cancelled() {
                interrupted = true;
                break;
            }
            self.update(*kind, |record| record.attempted = true);

            let state = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    interrupted = true;
                    SubsystemState::Degraded("startup interrupted".to_string())
                }
                result = timeout(step, AssertUnwindSafe(subsystem.initialize()).catch_unwind()) => match result {
                    Ok(Ok(InitOutcome::Ready)) => SubsystemState::Ready,
                    Ok(Ok(InitOutcome::Degraded(reason))) => SubsystemState::Degraded(reason),
                    Ok(Err(payload)) => SubsystemState::Degraded(format!(
                        "initialize panicked: {}",
                        describe_panic(payload)
                    )),
                    Err(_) => SubsystemState::Degraded(format!(
                        "initialization timed out after {:?}",
                        step
                    )),
                },
            };

            match &state {
                SubsystemState::Ready => info!(subsystem = %kind, "Subsystem ready"),
                SubsystemState::Degraded(reason) => {
                    warn!(subsystem = %kind, error = %reason, "Subsystem failed to initialize; continuing degraded")
                }
                SubsystemState::Uninitialized => {}
            }
            self.update(*kind, |record| record.state = state);

            if interrupted {
                break;
            }
        }

        let supervisor_launched = if interrupted {
            warn!("Startup interrupted by shutdown request");
            false
        } else if self.state(SubsystemKind::AgentPool).is_ready() {
            self.supervisor.launch(self.agent_pool.clone())
        } else {
            warn!("Agent pool unavailable; task processor not launched");
            false
        };

        let report = StartupReport {
            subsystems: self.states(),
            supervisor_launched,
            interrupted,
        };
        let ready = report.subsystems.values().filter(|s| s.is_ready()).count();
        info!(ready, total = report.subsystems.len(), "Startup complete");
        Ok(report)
    }

    /// Halts the task processor, then closes every attempted subsystem in
    /// reverse startup order. Never fails; problems land in the report.
    pub async fn stop(&self) -> ShutdownReport {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Lifecycle already stopped");
            return ShutdownReport::default();
        }
        self.shutdown.cancel();
        info!("Stopping subsystems");

        let deadline = self.settings.shutdown_deadline;
        let mut report = ShutdownReport::default();
        if timeout(deadline, self.teardown(&mut report)).await.is_err() {
            warn!(
                deadline_ms = deadline.as_millis() as u64,
                "Shutdown deadline exceeded; abandoning remaining teardown"
            );
            report.deadline_exceeded = true;
        }

        info!(
            closed = report.closed.len(),
            failed = report.failures.len(),
            "Shutdown complete"
        );
        report
    }

    async fn teardown(&self, report: &mut ShutdownReport) {
        let _startup = self.startup.lock().await;

        report.supervisor = Some(self.supervisor.halt(self.settings.halt_grace).await);

        let step = self.settings.teardown_step_timeout;
        for (kind, subsystem) in self.subsystems.iter().rev() {
            if !self.claim_close(*kind) {
                continue;
            }

            let reason = match timeout(step, AssertUnwindSafe(subsystem.close()).catch_unwind()).await {
                Ok(Ok(Ok(()))) => {
                    debug!(subsystem = %kind, "Subsystem closed");
                    report.closed.push(*kind);
                    continue;
                }
                Ok(Ok(Err(e))) => format!("{:#}", e),
                Ok(Err(payload)) => format!("close panicked: {}", describe_panic(payload)),
                Err(_) => format!("close timed out after {:?}", step),
            };
            warn!(subsystem = %kind, error = %reason, "Subsystem teardown failed");
            report.failures.push((*kind, reason));
        }
    }

    /// Cancels a startup in progress and signals the server to drain. Safe to
    /// call from a signal handler at any time.
    pub fn request_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutdown requested");
        }
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self, kind: SubsystemKind) -> SubsystemState {
        self.records
            .lock()
            .get(&kind)
            .map(|record| record.state.clone())
            .unwrap_or(SubsystemState::Uninitialized)
    }

    pub fn states(&self) -> BTreeMap<SubsystemKind, SubsystemState> {
        self.records
            .lock()
            .iter()
            .map(|(kind, record)| (*kind, record.state.clone()))
            .collect()
    }

    pub fn agent_pool(&self) -> Arc<dyn AgentPool> {
        self.agent_pool.clone()
    }

    fn update(&self, kind: SubsystemKind, apply: impl FnOnce(&mut Record)) {
        if let Some(record) = self.records.lock().get_mut(&kind) {
            apply(record);
        }
    }

    /// Marks the subsystem closed if it was attempted and not yet closed.
    fn claim_close(&self, kind: SubsystemKind) -> bool {
        match self.records.lock().get_mut(&kind) {
            Some(record) if record.attempted && !record.closed => {
                record.closed = true;
                true
            }
            _ => false,
        }
    }
}

fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    panic_message(payload.as_ref()).unwrap_or_else(|| "unknown panic".to_string())
}
