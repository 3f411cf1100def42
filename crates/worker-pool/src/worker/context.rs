//! The pool's model of one worker

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::util::duration_millis;

/// Unique worker identifier (UUID v7); a replacement worker gets a new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Accumulating per-worker counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// Tasks that finished successfully
    pub tasks_completed: u64,

    /// Failed attempts attributed to this worker
    pub errors: u64,

    /// Sum of processing time over completed tasks
    #[serde(with = "duration_millis")]
    pub total_processing_time: Duration,

    /// Rolling average over completed tasks
    #[serde(with = "duration_millis")]
    pub average_processing_time: Duration,

    /// Last time the worker finished or failed a task
    pub last_active: Option<DateTime<Utc>>,
}

impl WorkerMetrics {
    /// Record a completed task
    pub fn record_success(&mut self, processing_time: Duration) {
        self.tasks_completed += 1;
        self.total_processing_time += processing_time;
        self.average_processing_time = self
            .total_processing_time
            .div_f64(self.tasks_completed as f64);
        self.touch();
    }

    /// Record a failed attempt
    pub fn record_error(&mut self) {
        self.errors += 1;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_active = Some(Utc::now());
    }
}

/// Snapshot of one worker, part of [`crate::pool::PoolStatus`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub busy: bool,
    pub ready: bool,
    pub metrics: WorkerMetrics,
}

/// One worker as seen by the pool
///
/// Holds the worker's link exclusively. `busy` is true exactly while a task
/// is bound; a worker that is not `ready` never receives a task.
pub struct WorkerContext<L> {
    id: WorkerId,
    link: L,
    busy: bool,
    ready: bool,
    metrics: WorkerMetrics,
    send_failures: u32,
    bound_at: Option<Instant>,
}

impl<L> WorkerContext<L> {
    pub fn new(id: WorkerId, link: L) -> Self {
        Self {
            id,
            link,
            busy: false,
            ready: false,
            metrics: WorkerMetrics::default(),
            send_failures: 0,
            bound_at: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Ready and not bound to a task
    pub fn is_available(&self) -> bool {
        self.ready && !self.busy
    }

    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id,
            busy: self.busy,
            ready: self.ready,
            metrics: self.metrics.clone(),
        }
    }

    pub(crate) fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut WorkerMetrics {
        &mut self.metrics
    }

    /// Returns true if the worker was not ready before
    pub(crate) fn mark_ready(&mut self) -> bool {
        !std::mem::replace(&mut self.ready, true)
    }

    pub(crate) fn bind(&mut self) {
        self.busy = true;
        self.bound_at = Some(Instant::now());
    }

    /// Free the worker; returns how long the task was bound
    pub(crate) fn release(&mut self) -> Duration {
        self.busy = false;
        self.bound_at
            .take()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    pub(crate) fn send_succeeded(&mut self) {
        self.send_failures = 0;
    }

    /// Returns the number of consecutive send failures
    pub(crate) fn send_failed(&mut self) -> u32 {
        self.send_failures += 1;
        self.send_failures
    }
}

impl<L> fmt::Debug for WorkerContext<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("id", &self.id)
            .field("busy", &self.busy)
            .field("ready", &self.ready)
            .field("send_failures", &self.send_failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average() {
        let mut metrics = WorkerMetrics::default();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(300));

        assert_eq!(metrics.tasks_completed, 2);
        assert_eq!(metrics.total_processing_time, Duration::from_millis(400));
        assert_eq!(metrics.average_processing_time, Duration::from_millis(200));
        assert!(metrics.last_active.is_some());
    }

    #[test]
    fn test_errors_do_not_move_average() {
        let mut metrics = WorkerMetrics::default();
        metrics.record_success(Duration::from_millis(50));
        metrics.record_error();

        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.tasks_completed, 1);
        assert_eq!(metrics.average_processing_time, Duration::from_millis(50));
    }

    #[test]
    fn test_new_worker_is_not_available_until_ready() {
        let mut ctx = WorkerContext::new(WorkerId::new(), ());
        assert!(!ctx.is_ready());
        assert!(!ctx.is_available());

        assert!(ctx.mark_ready());
        assert!(!ctx.mark_ready());
        assert!(ctx.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_and_release() {
        let mut ctx = WorkerContext::new(WorkerId::new(), ());
        ctx.mark_ready();

        ctx.bind();
        assert!(ctx.is_busy());
        assert!(!ctx.is_available());

        tokio::time::advance(Duration::from_millis(40)).await;
        let held = ctx.release();
        assert_eq!(held, Duration::from_millis(40));
        assert!(ctx.is_available());
    }

    #[test]
    fn test_send_failure_counter_resets() {
        let mut ctx = WorkerContext::new(WorkerId::new(), ());
        assert_eq!(ctx.send_failed(), 1);
        assert_eq!(ctx.send_failed(), 2);
        ctx.send_succeeded();
        assert_eq!(ctx.send_failed(), 1);
    }
}
