pub mod orchestrator;
pub mod supervisor;

pub use orchestrator::{Lifecycle, LifecycleError, ShutdownReport, StartupReport};
pub use supervisor::{HaltOutcome, TaskSupervisor};

use std::any::Any;
use std::time::Duration;

use crate::config::TimeoutConfig;

/// Time bounds applied by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Upper bound on a single `initialize()` call.
    pub startup_step_timeout: Duration,
    /// Upper bound on a single `close()` call.
    pub teardown_step_timeout: Duration,
    /// Upper bound on the whole of `stop()`.
    pub shutdown_deadline: Duration,
    /// How long the task processor gets to return once signaled.
    pub halt_grace: Duration,
}

impl From<&TimeoutConfig> for LifecycleSettings {
    fn from(timeouts: &TimeoutConfig) -> Self {
        Self {
            startup_step_timeout: timeouts.startup_step(),
            teardown_step_timeout: timeouts.teardown_step(),
            shutdown_deadline: timeouts.shutdown_deadline(),
            halt_grace: timeouts.halt_grace(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Text of a caught panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
}
