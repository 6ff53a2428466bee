//! Scriptable collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::agents::AgentPool;
use crate::subsystems::{InitOutcome, Subsystem};
use crate::types::{PoolStats, PoolStatus};

/// Shared log of collaborator calls, in the order they happened.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail(&'static str),
    /// Never completes.
    Hang,
    Panic(&'static str),
}

async fn init_with(behavior: Behavior) -> InitOutcome {
    match behavior {
        Behavior::Succeed => InitOutcome::Ready,
        Behavior::Fail(reason) => InitOutcome::Degraded(reason.to_string()),
        Behavior::Hang => pending().await,
        Behavior::Panic(message) => panic!("{}", message),
    }
}

async fn act_with(behavior: Behavior) -> Result<()> {
    match behavior {
        Behavior::Succeed => Ok(()),
        Behavior::Fail(reason) => Err(anyhow!(reason)),
        Behavior::Hang => pending().await,
        Behavior::Panic(message) => panic!("{}", message),
    }
}

pub struct MockSubsystem {
    name: &'static str,
    init: Behavior,
    close: Behavior,
    journal: Journal,
    init_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockSubsystem {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            init: Behavior::Succeed,
            close: Behavior::Succeed,
            journal: journal.clone(),
            init_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_init(mut self, behavior: Behavior) -> Self {
        self.init = behavior;
        self
    }

    pub fn with_close(mut self, behavior: Behavior) -> Self {
        self.close = behavior;
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subsystem for MockSubsystem {
    async fn initialize(&self) -> InitOutcome {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(format!("init:{}", self.name));
        init_with(self.init).await
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(format!("close:{}", self.name));
        act_with(self.close).await
    }
}

pub struct MockPool {
    init: Behavior,
    close: Behavior,
    query: Behavior,
    status: PoolStatus,
    honors_cancellation: bool,
    processor_panics: bool,
    journal: Journal,
    init_calls: AtomicUsize,
    close_calls: AtomicUsize,
    runs: AtomicUsize,
    processing: AtomicBool,
    returned: AtomicBool,
}

impl MockPool {
    pub fn ready() -> Self {
        Self {
            init: Behavior::Succeed,
            close: Behavior::Succeed,
            query: Behavior::Succeed,
            status: PoolStatus {
                stats: PoolStats {
                    max_concurrent: 5,
                    ..PoolStats::default()
                },
                ..PoolStatus::default()
            },
            honors_cancellation: true,
            processor_panics: false,
            journal: journal(),
            init_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            processing: AtomicBool::new(false),
            returned: AtomicBool::new(false),
        }
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    pub fn with_init(mut self, behavior: Behavior) -> Self {
        self.init = behavior;
        self
    }

    pub fn with_close(mut self, behavior: Behavior) -> Self {
        self.close = behavior;
        self
    }

    /// How `status()` responds. `Succeed` returns the configured status.
    pub fn with_query(mut self, behavior: Behavior) -> Self {
        self.query = behavior;
        self
    }

    pub fn with_status(mut self, status: PoolStatus) -> Self {
        self.status = status;
        self
    }

    pub fn ignoring_cancellation(mut self) -> Self {
        self.honors_cancellation = false;
        self
    }

    pub fn panicking_processor(mut self) -> Self {
        self.processor_panics = true;
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn processor_runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn processor_returned(&self) -> bool {
        self.returned.load(Ordering::SeqCst)
    }

    pub async fn wait_until_processing(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !self.processing.load(Ordering::SeqCst) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "task processor never started"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Subsystem for MockPool {
    async fn initialize(&self) -> InitOutcome {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push("init:agent_pool".to_string());
        init_with(self.init).await
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push("close:agent_pool".to_string());
        act_with(self.close).await
    }
}

#[async_trait]
impl AgentPool for MockPool {
    async fn status(&self) -> Result<PoolStatus> {
        act_with(self.query).await?;
        Ok(self.status.clone())
    }

    async fn process_tasks(&self, shutdown: CancellationToken) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push("process:start".to_string());
        self.processing.store(true, Ordering::SeqCst);

        if self.processor_panics {
            panic!("task processor crashed");
        }
        if self.honors_cancellation {
            shutdown.cancelled().await;
        } else {
            pending::<()>().await;
        }

        self.journal.lock().push("process:stop".to_string());
        self.returned.store(true, Ordering::SeqCst);
        Ok(())
    }
}
