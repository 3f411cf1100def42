//! Messages a worker sends back to the pool

use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskMetrics};

/// Kind used by the default readiness check
pub const READY_KIND: &str = "ready";

/// Out-of-band message not tied to a task
///
/// The pool only looks at these to detect readiness; everything else is
/// re-published on the event bus untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Discriminant chosen by the worker
    pub kind: String,

    /// Opaque content
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SystemMessage {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// The handshake message recognized by the default readiness check
    pub fn ready() -> Self {
        Self::new(READY_KIND, serde_json::Value::Null)
    }
}

/// Terminal outcome of one task attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    Result(serde_json::Value),
    Error(String),
}

impl From<Result<serde_json::Value, String>> for ReplyOutcome {
    fn from(result: Result<serde_json::Value, String>) -> Self {
        match result {
            Ok(value) => Self::Result(value),
            Err(error) => Self::Error(error),
        }
    }
}

/// Reply correlated to a task by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReply {
    pub task_id: TaskId,
    pub outcome: ReplyOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TaskMetrics>,
}

/// Envelope for everything a worker sends to the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Reply(TaskReply),
    System(SystemMessage),
}
