//! Submitter-side handle to a task's outcome

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::error::PoolError;
use super::lifecycle::TaskResult;
use crate::task::{TaskId, TaskSuccess};

/// Resolves once the task settles
///
/// A handle returned for a rejected submission is ready immediately. If the
/// pool is dropped before the task settles the handle yields
/// [`PoolError::Closed`].
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    state: HandleState,
}

#[derive(Debug)]
enum HandleState {
    Pending(oneshot::Receiver<TaskResult>),
    Rejected(Option<PoolError>),
}

impl TaskHandle {
    pub(crate) fn pending(task_id: TaskId, rx: oneshot::Receiver<TaskResult>) -> Self {
        Self {
            task_id,
            state: HandleState::Pending(rx),
        }
    }

    pub(crate) fn rejected(task_id: TaskId, error: PoolError) -> Self {
        Self {
            task_id,
            state: HandleState::Rejected(Some(error)),
        }
    }

    /// Id assigned at submission
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl Future for TaskHandle {
    type Output = Result<TaskSuccess, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            HandleState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(PoolError::Closed))),
            HandleState::Rejected(error) => {
                Poll::Ready(Err(error.take().unwrap_or(PoolError::Closed)))
            }
        }
    }
}
