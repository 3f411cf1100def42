//! Pool status snapshot

use serde::{Deserialize, Serialize};

use crate::worker::WorkerStatus;

/// Point-in-time view of a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Workers currently bound to a task
    pub active_workers: usize,

    /// Workers alive, ready or not
    pub total_workers: usize,

    /// Workers that completed the readiness handshake
    pub ready_workers: usize,

    /// Tasks waiting for a worker
    pub queue_length: usize,

    /// Tasks not yet settled, queued or bound
    pub pending_tasks: usize,

    /// Whether new submissions are accepted
    pub accepting: bool,

    /// Per-worker detail
    pub workers: Vec<WorkerStatus>,
}

impl PoolStatus {
    /// Workers ready and not bound
    pub fn idle_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.ready && !w.busy).count()
    }

    /// Tasks completed across all current workers
    pub fn tasks_completed(&self) -> u64 {
        self.workers.iter().map(|w| w.metrics.tasks_completed).sum()
    }
}
