//! Labelled worker agents and allocation

use crate::agent::AgentError;
use crate::core::config::AgentConfig;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

/// Name of the orchestrator's own node
pub const CONTROLLER: &str = "controller";

/// The agent a stage body runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHandle {
    pub name: String,
    pub labels: Vec<String>,
}

impl AgentHandle {
    /// The control node, used for bookkeeping stages that declare no label
    pub fn controller() -> Self {
        Self {
            name: CONTROLLER.to_string(),
            labels: Vec::new(),
        }
    }
}

/// A worker that can be allocated
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub name: String,
    pub labels: Vec<String>,
    /// Concurrent allocations the worker accepts
    pub executors: usize,
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>, labels: &[&str], executors: usize) -> Self {
        Self {
            name: name.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            executors,
        }
    }

    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

impl From<&AgentConfig> for WorkerSpec {
    fn from(config: &AgentConfig) -> Self {
        Self {
            name: config.name.clone(),
            labels: config.labels.clone(),
            executors: config.executors,
        }
    }
}

struct WorkerSlot {
    spec: WorkerSpec,
    busy: usize,
}

struct PoolInner {
    workers: Mutex<Vec<WorkerSlot>>,
    released: Notify,
}

impl PoolInner {
    fn workers(&self) -> MutexGuard<'_, Vec<WorkerSlot>> {
        self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pool of labelled workers.
///
/// `acquire` blocks until a worker carrying the label has a free executor.
#[derive(Clone)]
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

impl AgentPool {
    pub fn new(workers: Vec<WorkerSpec>) -> Self {
        let slots = workers
            .into_iter()
            .map(|spec| WorkerSlot { spec, busy: 0 })
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                workers: Mutex::new(slots),
                released: Notify::new(),
            }),
        }
    }

    pub fn from_configs(configs: &[AgentConfig]) -> Self {
        Self::new(configs.iter().map(WorkerSpec::from).collect())
    }

    /// Whether any worker carries the label
    pub fn provides(&self, label: &str) -> bool {
        self.inner.workers().iter().any(|w| w.spec.has_label(label))
    }

    /// Wait for a worker with the label.
    ///
    /// Fails straight away when no worker carries the label at all, since
    /// waiting could never succeed.
    pub async fn acquire(&self, label: &str) -> Result<AgentLease, AgentError> {
        if !self.provides(label) {
            return Err(AgentError::NoMatchingAgent(label.to_string()));
        }

        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(lease) = self.try_acquire(label) {
                return Ok(lease);
            }

            debug!("Waiting for an agent labelled '{}'", label);
            released.await;
        }
    }

    /// Allocate without waiting
    pub fn try_acquire(&self, label: &str) -> Option<AgentLease> {
        let mut workers = self.inner.workers();
        let (index, slot) = workers
            .iter_mut()
            .enumerate()
            .find(|(_, w)| w.spec.has_label(label) && w.busy < w.spec.executors)?;

        slot.busy += 1;
        debug!("Allocated agent {} for label '{}'", slot.spec.name, label);

        Some(AgentLease {
            handle: AgentHandle {
                name: slot.spec.name.clone(),
                labels: slot.spec.labels.clone(),
            },
            index,
            pool: self.inner.clone(),
        })
    }

    /// Allocations currently held on a worker
    pub fn busy(&self, worker: &str) -> usize {
        self.inner
            .workers()
            .iter()
            .find(|w| w.spec.name == worker)
            .map_or(0, |w| w.busy)
    }
}

/// An allocated executor slot, released on drop
pub struct AgentLease {
    handle: AgentHandle,
    index: usize,
    pool: Arc<PoolInner>,
}

impl AgentLease {
    pub fn handle(&self) -> &AgentHandle {
        &self.handle
    }
}

impl std::fmt::Debug for AgentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLease").field("agent", &self.handle.name).finish()
    }
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        {
            let mut workers = self.pool.workers();
            if let Some(slot) = workers.get_mut(self.index) {
                slot.busy = slot.busy.saturating_sub(1);
            }
        }
        self.pool.released.notify_waiters();
    }
}
