//! In-process workers backed by async handlers
//!
//! [`HandlerWorkerFactory`] spawns each worker as a tokio task that:
//! 1. Announces readiness
//! 2. Receives one framed task at a time
//! 3. Runs the handler registered for the task's type
//! 4. Replies with the result and the measured processing time
//!
//! A handler that panics takes its worker down; the pool sees a fault and
//! replaces the worker.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::framing::{unframe, FramedMessage, TaskRequest};
use super::link::{LinkError, WorkerFactory, WorkerInbox, WorkerLink};
use super::message::{ReplyOutcome, TaskReply};
use crate::task::TaskMetrics;

/// Handler execution result
pub type HandlerResult = Result<serde_json::Value, String>;

/// Task handler function type
pub type TaskHandler =
    Arc<dyn Fn(TaskRequest) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync>;

/// Factory for in-process handler workers
///
/// Handlers are shared by every worker the factory spawns, including
/// replacements, and may be registered before or after the pool starts.
///
/// # Example
///
/// ```ignore
/// let factory = HandlerWorkerFactory::new();
/// factory.register_handler("echo", |request| async move {
///     Ok(request.payload.data)
/// });
///
/// let pool: WorkerPool<_> = WorkerPool::new(factory, WorkerPoolConfig::default())?;
/// ```
#[derive(Clone, Default)]
pub struct HandlerWorkerFactory {
    handlers: Arc<RwLock<HashMap<String, TaskHandler>>>,
}

impl HandlerWorkerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a task type, replacing any previous one
    pub fn register_handler<F, Fut>(&self, task_type: &str, handler: F)
    where
        F: Fn(TaskRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(move |request| Box::pin(handler(request)));
        self.handlers.write().insert(task_type.to_string(), handler);
    }

    /// Registered task types
    pub fn task_types(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

impl fmt::Debug for HandlerWorkerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerWorkerFactory")
            .field("task_types", &self.task_types())
            .finish()
    }
}

impl WorkerFactory for HandlerWorkerFactory {
    type Link = HandlerLink;

    fn spawn(&self, inbox: WorkerInbox) -> Result<HandlerLink, LinkError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LinkError::Spawn(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = runtime.spawn(run_worker(inbox, rx, Arc::clone(&self.handlers)));

        Ok(HandlerLink { tx, handle })
    }
}

/// Link to a handler worker task
#[derive(Debug)]
pub struct HandlerLink {
    tx: mpsc::UnboundedSender<FramedMessage>,
    handle: JoinHandle<()>,
}

impl WorkerLink for HandlerLink {
    fn post(&mut self, message: FramedMessage) -> Result<(), LinkError> {
        self.tx.send(message).map_err(|_| LinkError::Closed)
    }

    fn terminate(&mut self) {
        self.handle.abort();
    }
}

async fn run_worker(
    inbox: WorkerInbox,
    mut rx: mpsc::UnboundedReceiver<FramedMessage>,
    handlers: Arc<RwLock<HashMap<String, TaskHandler>>>,
) {
    let worker_id = inbox.worker_id();
    if inbox.ready().is_err() {
        return;
    }
    debug!(worker_id = %worker_id, "Worker ready");

    // Owned by this task, so aborting the worker also aborts a running handler
    let mut running = JoinSet::new();

    while let Some(framed) = rx.recv().await {
        let request = unframe(framed);
        let task_id = request.task_id;
        let handler = handlers.read().get(&request.task_type).cloned();

        let Some(handler) = handler else {
            warn!(
                worker_id = %worker_id,
                task_id = %task_id,
                task_type = %request.task_type,
                "No handler registered for task type"
            );
            let reply = TaskReply {
                task_id,
                outcome: ReplyOutcome::Error(format!(
                    "no handler registered for task type: {}",
                    request.task_type
                )),
                metrics: None,
            };
            if inbox.reply(reply).is_err() {
                break;
            }
            continue;
        };

        let started = Instant::now();
        running.spawn(handler(request));
        let Some(joined) = running.join_next().await else {
            break;
        };

        match joined {
            Ok(result) => {
                let reply = TaskReply {
                    task_id,
                    outcome: result.into(),
                    metrics: Some(TaskMetrics::new(started.elapsed())),
                };
                if inbox.reply(reply).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(worker_id = %worker_id, task_id = %task_id, error = %e, "Handler crashed");
                let _ = inbox.fault(format!("handler crashed: {e}"));
                break;
            }
        }
    }

    debug!(worker_id = %worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Payload, TaskId};
    use crate::worker::context::WorkerId;
    use crate::worker::framing::frame;
    use crate::worker::link::Inbound;
    use crate::worker::message::WorkerMessage;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    async fn double(request: TaskRequest) -> HandlerResult {
        let n = request.payload.data.as_i64().ok_or("not a number")?;
        Ok(json!(n * 2))
    }

    async fn explode(_request: TaskRequest) -> HandlerResult {
        panic!("boom")
    }

    fn inbox() -> (WorkerInbox, mpsc::UnboundedReceiver<(WorkerId, Inbound)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WorkerInbox::new(WorkerId::new(), tx), rx)
    }

    async fn next_message(rx: &mut mpsc::UnboundedReceiver<(WorkerId, Inbound)>) -> Inbound {
        rx.recv().await.unwrap().1
    }

    #[tokio::test]
    async fn test_worker_announces_ready() {
        let factory = HandlerWorkerFactory::new();
        let (inbox, mut rx) = inbox();
        let _link = factory.spawn(inbox).unwrap();

        match next_message(&mut rx).await {
            Inbound::Message(WorkerMessage::System(msg)) => assert_eq!(msg.kind, "ready"),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_replies_with_handler_result() {
        let factory = HandlerWorkerFactory::new();
        factory.register_handler("double", double);

        let (inbox, mut rx) = inbox();
        let mut link = factory.spawn(inbox).unwrap();
        next_message(&mut rx).await;

        let task_id = TaskId::new();
        link.post(frame(task_id, "double", &Payload::new(json!(21))))
            .unwrap();

        match next_message(&mut rx).await {
            Inbound::Message(WorkerMessage::Reply(reply)) => {
                assert_eq!(reply.task_id, task_id);
                assert_eq!(reply.outcome, ReplyOutcome::Result(json!(42)));
                assert!(reply.metrics.is_some());
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_error_is_replied() {
        let factory = HandlerWorkerFactory::new();
        factory.register_handler("double", double);

        let (inbox, mut rx) = inbox();
        let mut link = factory.spawn(inbox).unwrap();
        next_message(&mut rx).await;

        link.post(frame(TaskId::new(), "double", &Payload::new(json!("x"))))
            .unwrap();

        match next_message(&mut rx).await {
            Inbound::Message(WorkerMessage::Reply(reply)) => {
                assert_eq!(reply.outcome, ReplyOutcome::Error("not a number".into()));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_task_type_is_an_error_reply() {
        let factory = HandlerWorkerFactory::new();
        let (inbox, mut rx) = inbox();
        let mut link = factory.spawn(inbox).unwrap();
        next_message(&mut rx).await;

        link.post(frame(TaskId::new(), "missing", &Payload::default()))
            .unwrap();

        match next_message(&mut rx).await {
            Inbound::Message(WorkerMessage::Reply(reply)) => {
                assert!(matches!(reply.outcome, ReplyOutcome::Error(ref e) if e.contains("missing")));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_faults_worker() {
        let factory = HandlerWorkerFactory::new();
        factory.register_handler("explode", explode);

        let (inbox, mut rx) = inbox();
        let mut link = factory.spawn(inbox).unwrap();
        next_message(&mut rx).await;

        link.post(frame(TaskId::new(), "explode", &Payload::default()))
            .unwrap();

        assert!(matches!(next_message(&mut rx).await, Inbound::Fault(_)));
    }

    #[tokio::test]
    async fn test_terminated_link_rejects_posts() {
        let factory = HandlerWorkerFactory::new();
        let (inbox, mut rx) = inbox();
        let mut link = factory.spawn(inbox).unwrap();
        next_message(&mut rx).await;

        link.terminate();
        tokio::task::yield_now().await;

        // The aborted task drops its receiver
        let mut result = Ok(());
        for _ in 0..10 {
            result = link.post(frame(TaskId::new(), "noop", &Payload::default()));
            if result.is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(result, Err(LinkError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_aborts_running_handler() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let factory = HandlerWorkerFactory::new();
        factory.register_handler("slow", move |_request| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(json!(null))
            }
        });

        let (inbox, mut rx) = inbox();
        let mut link = factory.spawn(inbox).unwrap();
        next_message(&mut rx).await;

        link.post(frame(TaskId::new(), "slow", &Payload::default()))
            .unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        link.terminate();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(!finished.load(Ordering::SeqCst));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let factory = HandlerWorkerFactory::new();
        let (inbox, _rx) = inbox();
        assert!(matches!(factory.spawn(inbox), Err(LinkError::Spawn(_))));
    }
}
