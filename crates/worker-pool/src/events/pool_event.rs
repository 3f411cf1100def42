//! Events published by a worker pool

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::bus::BusEvent;
use crate::pool::{FailureCause, PoolStatus};
use crate::task::TaskId;
use crate::util::duration_millis;
use crate::worker::{SystemMessage, WorkerId};

/// Observable pool state change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PoolEvent {
    /// A task settled successfully
    TaskCompleted {
        task_id: TaskId,
        worker_id: WorkerId,
        #[serde(with = "duration_millis")]
        processing_time: Duration,
    },

    /// A task settled with a terminal failure
    TaskFailed {
        task_id: TaskId,
        cause: FailureCause,
        attempts: u32,
    },

    /// A failed attempt was put back at the head of its level
    TaskRetry {
        task_id: TaskId,
        retries_left: u32,
        cause: FailureCause,
    },

    /// Queue length reached the advisory limit
    QueueFull {
        queue_length: usize,
        max_queue_size: usize,
    },

    /// A worker completed the readiness handshake
    WorkerReady { worker_id: WorkerId },

    /// A worker was terminated and a fresh one took its slot
    WorkerReplaced {
        old_worker_id: WorkerId,
        new_worker_id: WorkerId,
        reason: String,
    },

    /// A system message the pool does not interpret
    WorkerMessage {
        worker_id: WorkerId,
        message: SystemMessage,
    },

    /// Periodic status snapshot
    Metrics(PoolStatus),

    /// The pool finished shutting down
    Shutdown,
}

/// Discriminant of [`PoolEvent`], used to subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEventKind {
    TaskCompleted,
    TaskFailed,
    TaskRetry,
    QueueFull,
    WorkerReady,
    WorkerReplaced,
    WorkerMessage,
    Metrics,
    Shutdown,
}

impl PoolEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCompleted => "task-completed",
            Self::TaskFailed => "task-failed",
            Self::TaskRetry => "task-retry",
            Self::QueueFull => "queue-full",
            Self::WorkerReady => "worker-ready",
            Self::WorkerReplaced => "worker-replaced",
            Self::WorkerMessage => "worker-message",
            Self::Metrics => "metrics",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for PoolEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BusEvent for PoolEvent {
    type Kind = PoolEventKind;

    fn kind(&self) -> PoolEventKind {
        match self {
            Self::TaskCompleted { .. } => PoolEventKind::TaskCompleted,
            Self::TaskFailed { .. } => PoolEventKind::TaskFailed,
            Self::TaskRetry { .. } => PoolEventKind::TaskRetry,
            Self::QueueFull { .. } => PoolEventKind::QueueFull,
            Self::WorkerReady { .. } => PoolEventKind::WorkerReady,
            Self::WorkerReplaced { .. } => PoolEventKind::WorkerReplaced,
            Self::WorkerMessage { .. } => PoolEventKind::WorkerMessage,
            Self::Metrics(_) => PoolEventKind::Metrics,
            Self::Shutdown => PoolEventKind::Shutdown,
        }
    }
}
