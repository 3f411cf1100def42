//! Pool errors

use serde::{Deserialize, Serialize};

use crate::queue::QueueError;
use crate::task::TaskId;
use crate::worker::LinkError;

/// Why a task attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureCause {
    /// The attempt outlived the task timeout
    #[error("timeout")]
    Timeout,

    /// The worker replied with an error
    #[error("{0}")]
    Remote(String),

    /// The task could not be posted to the worker
    #[error("{0}")]
    SendFailed(String),

    /// The worker faulted while the task was bound to it
    #[error("worker fault: {0}")]
    WorkerFault(String),

    /// The task outlived the stale threshold and was swept
    #[error("task exceeded stale threshold")]
    Stale,
}

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker pool is shutting down")]
    ShuttingDown,

    /// Terminal failure; displays the cause text
    #[error("{cause}")]
    TaskFailed { task_id: TaskId, cause: FailureCause },

    #[error("unknown priority: {0}")]
    UnknownPriority(String),

    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),

    /// The pool was dropped before the task settled
    #[error("worker pool closed")]
    Closed,
}

impl PoolError {
    /// The failure cause, for terminal task failures
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::TaskFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl From<QueueError> for PoolError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::UnknownPriority(level) => Self::UnknownPriority(level),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}

impl From<LinkError> for PoolError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Spawn(msg) => Self::WorkerSpawn(msg),
            other => Self::WorkerSpawn(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failed_displays_cause() {
        let err = PoolError::TaskFailed {
            task_id: TaskId::new(),
            cause: FailureCause::Remote("division by zero".into()),
        };
        assert_eq!(err.to_string(), "division by zero");

        let err = PoolError::TaskFailed {
            task_id: TaskId::new(),
            cause: FailureCause::Timeout,
        };
        assert_eq!(err.to_string(), "timeout");
        assert_eq!(err.cause(), Some(&FailureCause::Timeout));
    }

    #[test]
    fn test_queue_errors_map_to_pool_errors() {
        let err: PoolError = QueueError::EmptyLevels.into();
        assert!(matches!(err, PoolError::InvalidConfig(_)));

        let err: PoolError = QueueError::UnknownPriority("Urgent".into()).into();
        assert_eq!(err, PoolError::UnknownPriority("Urgent".into()));
    }

    #[test]
    fn test_failure_cause_serializes_tagged() {
        let json = serde_json::to_value(FailureCause::SendFailed("closed".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "send_failed", "message": "closed"}));

        let json = serde_json::to_value(FailureCause::Stale).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "stale"}));
    }
}
