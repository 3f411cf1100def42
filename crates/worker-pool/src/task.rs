//! Task records and result envelopes
//!
//! A [`Task`] is created once per submission and keeps its [`TaskId`] for its
//! whole life, including every retry.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::queue::Prioritized;
use crate::util::duration_millis;

/// Unique task identifier (UUID v7, time-ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Access the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque task payload
///
/// `data` is handed to the worker as-is. `attachments` are binary buffers the
/// transport moves instead of copying (see [`crate::worker::frame`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Plain, serializable part of the payload
    pub data: serde_json::Value,

    /// Buffers transferred by handle
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Bytes>,
}

impl Payload {
    /// Create a payload without attachments
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            attachments: Vec::new(),
        }
    }

    /// Add a binary attachment
    pub fn with_attachment(mut self, buffer: impl Into<Bytes>) -> Self {
        self.attachments.push(buffer.into());
        self
    }

    /// Whether the payload carries any attachments
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

impl From<serde_json::Value> for Payload {
    fn from(data: serde_json::Value) -> Self {
        Self::new(data)
    }
}

/// A unit of work tracked by the pool
#[derive(Debug, Clone)]
pub struct Task<P> {
    /// Stable identifier, assigned at submission
    pub id: TaskId,

    /// Caller-defined tag selecting the worker behavior
    pub task_type: String,

    /// Opaque payload, shared between the queue and the lifecycle record
    pub payload: Arc<Payload>,

    /// Dispatch priority, fixed at creation
    pub priority: P,

    /// Creation instant, used for staleness checks
    pub created_at: Instant,

    /// Wall-clock submission time, used for reporting
    pub submitted_at: DateTime<Utc>,

    /// How long one attempt may stay outstanding
    pub timeout: Duration,

    /// Remaining retries
    pub retries_left: u32,

    /// Retry budget at submission
    pub retry_budget: u32,
}

impl<P> Task<P> {
    /// Create a task with a full retry budget
    pub fn new(
        task_type: impl Into<String>,
        payload: Payload,
        priority: P,
        timeout: Duration,
        retries: u32,
    ) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            payload: Arc::new(payload),
            priority,
            created_at: Instant::now(),
            submitted_at: Utc::now(),
            timeout,
            retries_left: retries,
            retry_budget: retries,
        }
    }

    /// Current attempt number (1-based)
    pub fn attempt(&self) -> u32 {
        self.retry_budget - self.retries_left + 1
    }

    /// Whether another failure would be retried
    pub fn can_retry(&self) -> bool {
        self.retries_left > 0
    }

    /// Time since the task was submitted
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Whether the task has been outstanding for longer than `factor` timeouts
    pub fn is_stale(&self, now: Instant, factor: u32) -> bool {
        self.age(now) > self.timeout.saturating_mul(factor)
    }
}

impl<P: Copy + PartialEq + fmt::Debug> Prioritized for Task<P> {
    type Level = P;

    fn priority(&self) -> P {
        self.priority
    }
}

/// Processing figures reported by a worker alongside a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Time the worker spent on the task
    #[serde(with = "duration_millis")]
    pub processing_time: Duration,
}

impl TaskMetrics {
    pub fn new(processing_time: Duration) -> Self {
        Self { processing_time }
    }
}

/// Success envelope delivered to the submitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSuccess {
    /// Task that produced the result
    pub task_id: TaskId,

    /// Result returned by the worker
    pub data: serde_json::Value,

    /// Metrics reported by the worker, if any
    pub metrics: Option<TaskMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_id_roundtrip_through_string() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_task_ids_are_time_ordered() {
        let first = TaskId::new();
        let second = TaskId::new();
        assert!(first < second);
    }

    #[test]
    fn test_new_task_has_full_budget() {
        let task = Task::new("simulate", Payload::new(json!({})), 1u8, Duration::from_secs(1), 3);
        assert_eq!(task.retries_left, 3);
        assert_eq!(task.retry_budget, 3);
        assert_eq!(task.attempt(), 1);
        assert!(task.can_retry());
    }

    #[test]
    fn test_attempt_counts_consumed_retries() {
        let mut task = Task::new("simulate", Payload::default(), 1u8, Duration::from_secs(1), 2);
        task.retries_left = 0;
        assert_eq!(task.attempt(), 3);
        assert!(!task.can_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_uses_timeout_multiple() {
        let task = Task::new("simulate", Payload::default(), 1u8, Duration::from_secs(1), 0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(!task.is_stale(Instant::now(), 2));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(task.is_stale(Instant::now(), 2));
    }

    #[test]
    fn test_payload_attachments() {
        let payload = Payload::new(json!({"frames": 2}))
            .with_attachment(vec![1u8, 2, 3])
            .with_attachment(Bytes::from_static(b"abc"));

        assert!(payload.has_attachments());
        assert_eq!(payload.attachments.len(), 2);
        assert!(!Payload::new(json!(null)).has_attachments());
    }

    #[test]
    fn test_task_metrics_serialize_as_millis() {
        let metrics = TaskMetrics::new(Duration::from_millis(250));
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json, json!({"processing_time": 250}));
    }
}
