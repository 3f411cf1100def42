//! Outstanding task bookkeeping
//!
//! Every submitted task has exactly one [`LifecycleEntry`] until it settles.
//! Settling consumes the entry together with its responder, so a task can be
//! resolved or rejected at most once no matter which path gets there first.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::error::PoolError;
use crate::task::{Task, TaskId, TaskSuccess};

pub(crate) type TaskResult = Result<TaskSuccess, PoolError>;

/// Record of one outstanding task
#[derive(Debug)]
pub(crate) struct LifecycleEntry<P> {
    /// Authoritative task record; queued copies are rebuilt from it on retry
    pub task: Task<P>,
    responder: oneshot::Sender<TaskResult>,
    timer: Option<AbortHandle>,
    generation: u64,
}

impl<P> LifecycleEntry<P> {
    pub fn new(task: Task<P>, responder: oneshot::Sender<TaskResult>) -> Self {
        Self {
            task,
            responder,
            timer: None,
            generation: 0,
        }
    }

    /// Generation of the currently armed timer
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidate the current timer and return the generation for the next one
    pub fn next_generation(&mut self) -> u64 {
        self.clear_timer();
        self.generation += 1;
        self.generation
    }

    pub fn set_timer(&mut self, timer: AbortHandle) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    pub fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Settle successfully
    pub fn resolve(mut self, success: TaskSuccess) {
        self.clear_timer();
        // The submitter may have dropped its handle
        let _ = self.responder.send(Ok(success));
    }

    /// Settle with an error
    pub fn reject(mut self, error: PoolError) {
        self.clear_timer();
        let _ = self.responder.send(Err(error));
    }
}

/// Outstanding tasks by id
#[derive(Debug)]
pub(crate) struct TaskLifecycleTable<P> {
    entries: HashMap<TaskId, LifecycleEntry<P>>,
}

impl<P> Default for TaskLifecycleTable<P> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<P> TaskLifecycleTable<P> {
    pub fn insert(&mut self, entry: LifecycleEntry<P>) {
        self.entries.insert(entry.task.id, entry);
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&LifecycleEntry<P>> {
        self.entries.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &TaskId) -> Option<&mut LifecycleEntry<P>> {
        self.entries.get_mut(task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn remove(&mut self, task_id: &TaskId) -> Option<LifecycleEntry<P>> {
        self.entries.remove(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of tasks outstanding for longer than `factor` timeouts
    pub fn stale(&self, now: Instant, factor: u32) -> Vec<TaskId> {
        self.entries
            .values()
            .filter(|entry| entry.task.is_stale(now, factor))
            .map(|entry| entry.task.id)
            .collect()
    }

    /// Remove every entry
    pub fn drain(&mut self) -> impl Iterator<Item = LifecycleEntry<P>> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Payload;
    use serde_json::json;
    use std::time::Duration;

    fn entry(timeout: Duration) -> (LifecycleEntry<u8>, oneshot::Receiver<TaskResult>) {
        let (tx, rx) = oneshot::channel();
        let task = Task::new("work", Payload::default(), 0u8, timeout, 1);
        (LifecycleEntry::new(task, tx), rx)
    }

    #[test]
    fn test_resolve_delivers_once() {
        let mut table = TaskLifecycleTable::default();
        let (entry, mut rx) = entry(Duration::from_secs(1));
        let task_id = entry.task.id;
        table.insert(entry);

        let first = table.remove(&task_id).unwrap();
        first.resolve(TaskSuccess {
            task_id,
            data: json!("ok"),
            metrics: None,
        });

        // A second settlement path finds nothing
        assert!(table.remove(&task_id).is_none());
        let result = rx.try_recv().unwrap();
        assert_eq!(result.unwrap().data, json!("ok"));
    }

    #[test]
    fn test_reject_delivers_error() {
        let (entry, mut rx) = entry(Duration::from_secs(1));
        entry.reject(PoolError::ShuttingDown);
        assert_eq!(rx.try_recv().unwrap(), Err(PoolError::ShuttingDown));
    }

    #[test]
    fn test_settling_with_dropped_receiver_is_harmless() {
        let (entry, rx) = entry(Duration::from_secs(1));
        drop(rx);
        entry.reject(PoolError::Closed);
    }

    #[test]
    fn test_generation_advances() {
        let (mut entry, _rx) = entry(Duration::from_secs(1));
        assert_eq!(entry.generation(), 0);
        assert_eq!(entry.next_generation(), 1);
        assert_eq!(entry.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_timer_aborts_task() {
        let (mut entry, _rx) = entry(Duration::from_secs(1));
        let timer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        entry.set_timer(timer.abort_handle());
        entry.clear_timer();

        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries() {
        let mut table = TaskLifecycleTable::default();
        let (short, _rx1) = entry(Duration::from_millis(100));
        let (long, _rx2) = entry(Duration::from_secs(10));
        let short_id = short.task.id;
        table.insert(short);
        table.insert(long);

        tokio::time::advance(Duration::from_millis(250)).await;

        assert_eq!(table.stale(Instant::now(), 2), vec![short_id]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.drain().count(), 2);
        assert!(table.is_empty());
    }
}
