//! Background task-processing supervisor.
//!
//! Owns the single long-running activity that drains the agent pool's queue.
//! The activity is spawned once the pool is ready, and is cancelled and
//! joined with a bounded wait during shutdown.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::panic_message;
use crate::agents::AgentPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltOutcome {
    /// `launch` was never called.
    NotLaunched,
    /// The activity returned within the grace period.
    Stopped,
    /// The grace period elapsed and the activity was aborted.
    Aborted,
    /// The activity died from a panic before or during the halt.
    Panicked,
}

pub struct TaskSupervisor {
    shutdown_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the processing activity. Returns `false` if it is already running
    /// or the supervisor has been halted.
    pub fn launch(&self, pool: Arc<dyn AgentPool>) -> bool {
        let mut slot = self.handle.lock();
        if slot.is_some() {
            warn!("Task processor already launched");
            return false;
        }
        if self.shutdown_token.is_cancelled() {
            warn!("Task processor not launched: shutdown in progress");
            return false;
        }

        let token = self.shutdown_token.clone();
        *slot = Some(tokio::spawn(async move {
            info!("Task processor started");
            match pool.process_tasks(token).await {
                Ok(()) => info!("Task processor stopped"),
                Err(e) => error!(error = %format!("{:#}", e), "Task processor exited with error"),
            }
        }));
        true
    }

    pub fn is_launched(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Signals the activity to stop and waits up to `grace` for it to return.
    pub async fn halt(&self, grace: Duration) -> HaltOutcome {
        self.shutdown_token.cancel();

        let Some(mut handle) = self.handle.lock().take() else {
            return HaltOutcome::NotLaunched;
        };

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => HaltOutcome::Stopped,
            Ok(Err(e)) if e.is_panic() => {
                let message = panic_message(e.into_panic().as_ref())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(error = %message, "Task processor panicked");
                HaltOutcome::Panicked
            }
            Ok(Err(_)) => HaltOutcome::Aborted,
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Task processor did not stop in time; aborting");
                handle.abort();
                HaltOutcome::Aborted
            }
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
