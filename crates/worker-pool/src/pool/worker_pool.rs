//! Worker pool orchestrator
//!
//! All mutable state sits behind one mutex. Every entry point (submission,
//! inbound worker message, timer, periodic sweep) runs its whole state
//! transition under that lock without awaiting, collects the events it
//! produces, and publishes them after the lock is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::config::WorkerPoolConfig;
use super::error::{FailureCause, PoolError};
use super::handle::TaskHandle;
use super::lifecycle::{LifecycleEntry, TaskLifecycleTable};
use super::status::PoolStatus;
use crate::events::{EventBus, HandlerId, PoolEvent, PoolEventKind};
use crate::queue::{Priority, PriorityLevel, PriorityTaskQueue};
use crate::task::{Payload, Task, TaskId, TaskSuccess};
use crate::worker::{
    frame, Inbound, ReplyOutcome, SystemMessage, TaskReply, WorkerContext, WorkerFactory,
    WorkerId, WorkerInbox, WorkerLink, WorkerMessage, READY_KIND,
};

/// Decides whether a system message completes a worker's handshake
pub type Readiness = Arc<dyn Fn(&SystemMessage) -> bool + Send + Sync>;

type InboxSender = mpsc::UnboundedSender<(WorkerId, Inbound)>;
type InboxReceiver = mpsc::UnboundedReceiver<(WorkerId, Inbound)>;

/// Pool lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Constructed, no workers yet
    Idle,
    Running,
    /// Not accepting, waiting for outstanding tasks
    Draining,
    Stopped,
}

impl Phase {
    fn is_accepting(self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }
}

struct PoolState<L, P: PriorityLevel> {
    phase: Phase,
    runtime: Option<Handle>,
    workers: Vec<WorkerContext<L>>,
    queue: PriorityTaskQueue<Task<P>>,
    lifecycle: TaskLifecycleTable<P>,
    /// Which worker holds which task
    bindings: HashMap<TaskId, WorkerId>,
    background: Vec<JoinHandle<()>>,
}

impl<L, P: PriorityLevel> PoolState<L, P> {
    fn worker_mut(&mut self, worker_id: WorkerId) -> Option<&mut WorkerContext<L>> {
        self.workers.iter_mut().find(|w| w.id() == worker_id)
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            active_workers: self.workers.iter().filter(|w| w.is_busy()).count(),
            total_workers: self.workers.len(),
            ready_workers: self.workers.iter().filter(|w| w.is_ready()).count(),
            queue_length: self.queue.size(),
            pending_tasks: self.lifecycle.len(),
            accepting: self.phase.is_accepting(),
            workers: self.workers.iter().map(WorkerContext::status).collect(),
        }
    }
}

struct Shared<F: WorkerFactory, P: PriorityLevel> {
    factory: F,
    config: WorkerPoolConfig,
    events: EventBus<PoolEvent>,
    readiness: RwLock<Readiness>,
    state: Mutex<PoolState<F::Link, P>>,
    inbox_tx: InboxSender,
    inbox_rx: Mutex<Option<InboxReceiver>>,
    shutdown_tx: watch::Sender<bool>,
    /// Number of unsettled tasks, watched by `shutdown`
    pending_tx: watch::Sender<usize>,
}

/// Priority task pool over a fixed set of workers
///
/// Workers are started on the first submission (or [`WorkerPool::warm_up`]).
/// A task is offered to a worker only after the worker's readiness
/// handshake. Each task gets at most `max_retries` retries across timeouts,
/// error replies, send failures and worker faults; retries go to the head of
/// their priority level.
///
/// # Example
///
/// ```ignore
/// let factory = HandlerWorkerFactory::new();
/// factory.register_handler("resize", |request| async move { resize(request).await });
///
/// let pool: WorkerPool<_> = WorkerPool::new(factory, WorkerPoolConfig::default())?;
/// pool.events().on(PoolEventKind::TaskFailed, |event| warn!(?event, "Task failed"));
///
/// let result = pool.submit("resize", json!({"width": 64}), Priority::High).await?;
///
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool<F: WorkerFactory, P: PriorityLevel = Priority> {
    shared: Arc<Shared<F, P>>,
}

impl<F: WorkerFactory, P: PriorityLevel> Clone for WorkerPool<F, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: WorkerFactory, P: PriorityLevel> fmt::Debug for WorkerPool<F, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<F: WorkerFactory, P: PriorityLevel> WorkerPool<F, P> {
    /// Create a pool; nothing is spawned until the first submission
    pub fn new(factory: F, config: WorkerPoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let queue = PriorityTaskQueue::new(P::levels())?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let (pending_tx, _) = watch::channel(0);
        let readiness: Readiness = Arc::new(|message: &SystemMessage| message.kind == READY_KIND);

        let state = PoolState {
            phase: Phase::Idle,
            runtime: None,
            workers: Vec::with_capacity(config.worker_count),
            queue,
            lifecycle: TaskLifecycleTable::default(),
            bindings: HashMap::new(),
            background: Vec::new(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                factory,
                config,
                events: EventBus::new(),
                readiness: RwLock::new(readiness),
                state: Mutex::new(state),
                inbox_tx,
                inbox_rx: Mutex::new(Some(inbox_rx)),
                shutdown_tx,
                pending_tx,
            }),
        })
    }

    /// Replace the readiness check (default: system message kind `"ready"`)
    pub fn with_readiness<R>(self, readiness: R) -> Self
    where
        R: Fn(&SystemMessage) -> bool + Send + Sync + 'static,
    {
        *self.shared.readiness.write() = Arc::new(readiness);
        self
    }

    /// Event bus the pool publishes on
    pub fn events(&self) -> &EventBus<PoolEvent> {
        &self.shared.events
    }

    /// Shorthand for `events().on(kind, handler)`
    pub fn on<H>(&self, kind: PoolEventKind, handler: H) -> HandlerId
    where
        H: Fn(&PoolEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, handler)
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// Submit a task
    ///
    /// Registration happens before this returns; the handle only waits for
    /// the outcome. After shutdown has begun the handle is already rejected
    /// with [`PoolError::ShuttingDown`].
    pub fn submit(
        &self,
        task_type: impl Into<String>,
        payload: impl Into<Payload>,
        priority: P,
    ) -> TaskHandle {
        self.shared
            .submit(task_type.into(), payload.into(), priority)
    }

    /// Start the workers now instead of on the first submission
    pub fn warm_up(&self) -> Result<(), PoolError> {
        self.shared.transition(|state, _| match state.phase {
            Phase::Idle => self.shared.start(state),
            Phase::Running => Ok(()),
            Phase::Draining | Phase::Stopped => Err(PoolError::ShuttingDown),
        })
    }

    /// Whether workers exist, regardless of their handshake
    pub fn is_ready(&self) -> bool {
        !self.shared.state.lock().workers.is_empty()
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.shared.state.lock().phase.is_accepting()
    }

    /// Snapshot of workers, queue and outstanding tasks
    pub fn status(&self) -> PoolStatus {
        self.shared.state.lock().status()
    }

    /// Stop accepting, let outstanding tasks settle, then stop every worker
    ///
    /// Queued and in-flight tasks keep running to completion (or to terminal
    /// failure). Calling this again after it completed returns immediately.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        let mut pending_rx = {
            let mut state = self.shared.state.lock();
            match state.phase {
                Phase::Stopped => return Ok(()),
                Phase::Idle | Phase::Running => {
                    info!(
                        pending_tasks = state.lifecycle.len(),
                        queue_length = state.queue.size(),
                        "Initiating graceful shutdown"
                    );
                    state.phase = Phase::Draining;
                }
                Phase::Draining => {}
            }
            let pending_rx = self.shared.pending_tx.subscribe();
            self.shared.pending_tx.send_replace(state.lifecycle.len());
            pending_rx
        };

        pending_rx
            .wait_for(|pending| *pending == 0)
            .await
            .map_err(|_| PoolError::Closed)?;

        self.shared.finish_shutdown();
        Ok(())
    }
}

impl<F: WorkerFactory, P: PriorityLevel> Shared<F, P> {
    /// Run a state transition and publish the events it produced
    fn transition<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&mut PoolState<F::Link, P>, &mut Vec<PoolEvent>) -> R,
    ) -> R {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            let result = f(&mut state, &mut events);
            self.pending_tx.send_replace(state.lifecycle.len());
            result
        };

        for event in &events {
            self.events.emit(event);
        }
        result
    }

    fn submit(self: &Arc<Self>, task_type: String, payload: Payload, priority: P) -> TaskHandle {
        self.transition(|state, events| {
            let task = Task::new(
                task_type,
                payload,
                priority,
                self.config.task_timeout,
                self.config.max_retries,
            );
            let task_id = task.id;

            if !state.phase.is_accepting() {
                debug!(task_id = %task_id, "Rejecting task, pool is shutting down");
                return TaskHandle::rejected(task_id, PoolError::ShuttingDown);
            }
            if !state.queue.accepts(&priority) {
                return TaskHandle::rejected(
                    task_id,
                    PoolError::UnknownPriority(format!("{priority:?}")),
                );
            }
            if state.phase == Phase::Idle {
                if let Err(e) = self.start(state) {
                    return TaskHandle::rejected(task_id, e);
                }
            }

            debug!(
                task_id = %task_id,
                task_type = %task.task_type,
                priority = ?priority,
                "Task submitted"
            );

            let (tx, rx) = oneshot::channel();
            let mut entry = LifecycleEntry::new(task.clone(), tx);
            self.arm_timer(state.runtime.as_ref(), &mut entry);
            state.lifecycle.insert(entry);

            if let Err(e) = state.queue.enqueue(task) {
                if let Some(entry) = state.lifecycle.remove(&task_id) {
                    entry.reject(e.into());
                }
                return TaskHandle::pending(task_id, rx);
            }

            self.dispatch(state, events);

            let queue_length = state.queue.size();
            if queue_length >= self.config.max_queue_size {
                warn!(
                    queue_length,
                    max_queue_size = self.config.max_queue_size,
                    "Task queue is full"
                );
                events.push(PoolEvent::QueueFull {
                    queue_length,
                    max_queue_size: self.config.max_queue_size,
                });
            }

            TaskHandle::pending(task_id, rx)
        })
    }

    /// Spawn the workers and background loops
    fn start(self: &Arc<Self>, state: &mut PoolState<F::Link, P>) -> Result<(), PoolError> {
        let runtime = Handle::try_current().map_err(|e| PoolError::WorkerSpawn(e.to_string()))?;

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for _ in 0..self.config.worker_count {
            match self.spawn_worker() {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    error!(error = %e, "Failed to spawn worker");
                    for worker in &mut workers {
                        worker.link_mut().terminate();
                    }
                    return Err(e);
                }
            }
        }

        let inbox_rx = self.inbox_rx.lock().take().ok_or(PoolError::Closed)?;

        info!(
            workers = workers.len(),
            task_timeout_ms = self.config.task_timeout.as_millis() as u64,
            max_retries = self.config.max_retries,
            "Starting worker pool"
        );

        state.workers = workers;
        state.background = vec![
            runtime.spawn(Self::inbox_loop(
                Arc::downgrade(self),
                inbox_rx,
                self.shutdown_tx.subscribe(),
            )),
            runtime.spawn(Self::periodic_loop(
                "monitor",
                Arc::downgrade(self),
                self.config.monitor_interval,
                self.shutdown_tx.subscribe(),
                Self::emit_metrics,
            )),
            runtime.spawn(Self::periodic_loop(
                "cleanup",
                Arc::downgrade(self),
                self.config.cleanup_interval,
                self.shutdown_tx.subscribe(),
                Self::sweep_stale,
            )),
        ];
        state.runtime = Some(runtime);
        state.phase = Phase::Running;
        Ok(())
    }

    fn spawn_worker(&self) -> Result<WorkerContext<F::Link>, PoolError> {
        let worker_id = WorkerId::new();
        let inbox = WorkerInbox::new(worker_id, self.inbox_tx.clone());
        let link = self.factory.spawn(inbox)?;
        debug!(worker_id = %worker_id, "Worker spawned");
        Ok(WorkerContext::new(worker_id, link))
    }

    /// Arm a full-length timeout for the entry's current attempt
    fn arm_timer(self: &Arc<Self>, runtime: Option<&Handle>, entry: &mut LifecycleEntry<P>) {
        let Some(runtime) = runtime else {
            return;
        };

        let generation = entry.next_generation();
        let task_id = entry.task.id;
        let timeout = entry.task.timeout;
        let weak = Arc::downgrade(self);

        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_timeout(task_id, generation);
            }
        });
        entry.set_timer(timer.abort_handle());
    }

    /// Hand queued tasks to idle ready workers until one side runs out
    fn dispatch(self: &Arc<Self>, state: &mut PoolState<F::Link, P>, events: &mut Vec<PoolEvent>) {
        while state.queue.has_task() {
            let Some(index) = state.workers.iter().position(|w| w.is_available()) else {
                break;
            };
            let Some(task) = state.queue.dequeue() else {
                break;
            };
            if !state.lifecycle.contains(&task.id) {
                continue;
            }
            self.assign(state, index, task, events);
        }
    }

    fn assign(
        self: &Arc<Self>,
        state: &mut PoolState<F::Link, P>,
        index: usize,
        task: Task<P>,
        events: &mut Vec<PoolEvent>,
    ) {
        let worker_id = state.workers[index].id();
        state.bindings.insert(task.id, worker_id);

        let worker = &mut state.workers[index];
        worker.bind();
        let posted = worker
            .link_mut()
            .post(frame(task.id, &task.task_type, &task.payload));

        match posted {
            Ok(()) => {
                worker.send_succeeded();
                debug!(
                    task_id = %task.id,
                    worker_id = %worker_id,
                    attempt = task.attempt(),
                    "Task dispatched"
                );
            }
            Err(e) => {
                worker.release();
                worker.metrics_mut().record_error();
                let failures = worker.send_failed();
                state.bindings.remove(&task.id);

                warn!(
                    task_id = %task.id,
                    worker_id = %worker_id,
                    consecutive_failures = failures,
                    error = %e,
                    "Failed to post task to worker"
                );
                self.fail_attempt(state, task.id, FailureCause::SendFailed(e.to_string()), events);

                if failures >= self.config.max_send_failures {
                    let reason = format!("{failures} consecutive send failures");
                    self.replace_worker(state, worker_id, reason, events);
                }
            }
        }
    }

    /// Retry the task at the head of its level, or settle it as failed
    fn fail_attempt(
        self: &Arc<Self>,
        state: &mut PoolState<F::Link, P>,
        task_id: TaskId,
        cause: FailureCause,
        events: &mut Vec<PoolEvent>,
    ) {
        let runtime = state.runtime.clone();
        let Some(entry) = state.lifecycle.get_mut(&task_id) else {
            return;
        };

        if entry.task.can_retry() {
            entry.task.retries_left -= 1;
            let retries_left = entry.task.retries_left;
            self.arm_timer(runtime.as_ref(), entry);

            info!(
                task_id = %task_id,
                retries_left,
                cause = %cause,
                "Retrying task"
            );
            if state.queue.unshift(entry.task.clone()).is_err() {
                // Level was accepted at submission
                return;
            }
            events.push(PoolEvent::TaskRetry {
                task_id,
                retries_left,
                cause,
            });
            return;
        }

        let Some(entry) = state.lifecycle.remove(&task_id) else {
            return;
        };
        let attempts = entry.task.attempt();
        warn!(task_id = %task_id, attempts, cause = %cause, "Task failed");

        events.push(PoolEvent::TaskFailed {
            task_id,
            cause: cause.clone(),
            attempts,
        });
        entry.reject(PoolError::TaskFailed { task_id, cause });
    }

    /// Terminate a worker and start a fresh one in its slot
    fn replace_worker(
        self: &Arc<Self>,
        state: &mut PoolState<F::Link, P>,
        worker_id: WorkerId,
        reason: String,
        events: &mut Vec<PoolEvent>,
    ) {
        let Some(index) = state.workers.iter().position(|w| w.id() == worker_id) else {
            return;
        };
        state.workers[index].link_mut().terminate();
        // Anything still bound there is left to its timer
        state.bindings.retain(|_, bound| *bound != worker_id);

        match self.spawn_worker() {
            Ok(worker) => {
                let new_worker_id = worker.id();
                state.workers[index] = worker;
                info!(
                    old_worker_id = %worker_id,
                    new_worker_id = %new_worker_id,
                    reason = %reason,
                    "Worker replaced"
                );
                events.push(PoolEvent::WorkerReplaced {
                    old_worker_id: worker_id,
                    new_worker_id,
                    reason,
                });
            }
            Err(e) => {
                state.workers.remove(index);
                error!(
                    worker_id = %worker_id,
                    error = %e,
                    remaining_workers = state.workers.len(),
                    "Failed to replace worker"
                );
            }
        }
    }

    fn on_inbound(self: &Arc<Self>, worker_id: WorkerId, inbound: Inbound) {
        match inbound {
            Inbound::Message(WorkerMessage::Reply(reply)) => self.on_reply(worker_id, reply),
            Inbound::Message(WorkerMessage::System(message)) => {
                self.on_system(worker_id, message)
            }
            Inbound::Fault(reason) => self.on_worker_fault(worker_id, reason),
        }
    }

    fn on_reply(self: &Arc<Self>, worker_id: WorkerId, reply: TaskReply) {
        self.transition(|state, events| {
            let task_id = reply.task_id;
            if !state.lifecycle.contains(&task_id) {
                debug!(task_id = %task_id, worker_id = %worker_id, "Discarding reply for settled task");
                return;
            }
            if state.bindings.get(&task_id) != Some(&worker_id) {
                debug!(task_id = %task_id, worker_id = %worker_id, "Discarding stale reply");
                return;
            }
            state.bindings.remove(&task_id);

            let Some(worker) = state.worker_mut(worker_id) else {
                return;
            };
            let held = worker.release();
            let processing_time = reply.metrics.map_or(held, |m| m.processing_time);

            match reply.outcome {
                ReplyOutcome::Result(data) => {
                    worker.metrics_mut().record_success(processing_time);
                    if let Some(entry) = state.lifecycle.remove(&task_id) {
                        debug!(
                            task_id = %task_id,
                            worker_id = %worker_id,
                            processing_time_ms = processing_time.as_millis() as u64,
                            "Task completed"
                        );
                        events.push(PoolEvent::TaskCompleted {
                            task_id,
                            worker_id,
                            processing_time,
                        });
                        entry.resolve(TaskSuccess {
                            task_id,
                            data,
                            metrics: reply.metrics,
                        });
                    }
                }
                ReplyOutcome::Error(message) => {
                    worker.metrics_mut().record_error();
                    self.fail_attempt(state, task_id, FailureCause::Remote(message), events);
                }
            }

            self.dispatch(state, events);
        })
    }

    fn on_system(self: &Arc<Self>, worker_id: WorkerId, message: SystemMessage) {
        let readiness = Arc::clone(&*self.readiness.read());
        let is_ready = readiness(&message);

        self.transition(|state, events| {
            let Some(worker) = state.worker_mut(worker_id) else {
                debug!(worker_id = %worker_id, kind = %message.kind, "Ignoring message from unknown worker");
                return;
            };

            if is_ready {
                if worker.mark_ready() {
                    info!(worker_id = %worker_id, "Worker ready");
                    events.push(PoolEvent::WorkerReady { worker_id });
                }
                self.dispatch(state, events);
            } else {
                events.push(PoolEvent::WorkerMessage { worker_id, message });
            }
        })
    }

    fn on_worker_fault(self: &Arc<Self>, worker_id: WorkerId, reason: String) {
        self.transition(|state, events| {
            if state.worker_mut(worker_id).is_none() {
                return;
            }
            warn!(worker_id = %worker_id, reason = %reason, "Worker faulted");

            let bound = state
                .bindings
                .iter()
                .find(|(_, bound)| **bound == worker_id)
                .map(|(task_id, _)| *task_id);

            if let Some(task_id) = bound {
                state.bindings.remove(&task_id);
                if let Some(worker) = state.worker_mut(worker_id) {
                    worker.release();
                    worker.metrics_mut().record_error();
                }
                let cause = FailureCause::WorkerFault(reason.clone());
                self.fail_attempt(state, task_id, cause, events);
            }

            self.replace_worker(state, worker_id, reason, events);
            self.dispatch(state, events);
        })
    }

    fn on_timeout(self: &Arc<Self>, task_id: TaskId, generation: u64) {
        self.transition(|state, events| {
            match state.lifecycle.get(&task_id) {
                Some(entry) if entry.generation() == generation => {}
                _ => return,
            }

            match state.bindings.remove(&task_id) {
                Some(worker_id) => {
                    warn!(task_id = %task_id, worker_id = %worker_id, "Task timed out on worker");
                    if let Some(worker) = state.worker_mut(worker_id) {
                        worker.release();
                        worker.metrics_mut().record_error();
                    }
                }
                None => {
                    warn!(task_id = %task_id, "Task timed out in queue");
                    state.queue.retain(|task| task.id != task_id);
                }
            }

            self.fail_attempt(state, task_id, FailureCause::Timeout, events);
            self.dispatch(state, events);
        })
    }

    /// Reject tasks outstanding for longer than `stale_factor` timeouts
    ///
    /// Timers normally settle every task first; this only catches entries
    /// whose timer never fired.
    fn sweep_stale(self: &Arc<Self>) {
        self.transition(|state, events| {
            if state.lifecycle.is_empty() {
                return;
            }
            let stale = state
                .lifecycle
                .stale(Instant::now(), self.config.stale_factor);
            if stale.is_empty() {
                return;
            }

            for task_id in stale {
                match state.bindings.remove(&task_id) {
                    Some(worker_id) => {
                        if let Some(worker) = state.worker_mut(worker_id) {
                            worker.release();
                        }
                    }
                    None => {
                        state.queue.retain(|task| task.id != task_id);
                    }
                }

                let Some(entry) = state.lifecycle.remove(&task_id) else {
                    continue;
                };
                let attempts = entry.task.attempt();
                warn!(task_id = %task_id, attempts, "Rejecting stale task");

                events.push(PoolEvent::TaskFailed {
                    task_id,
                    cause: FailureCause::Stale,
                    attempts,
                });
                entry.reject(PoolError::TaskFailed {
                    task_id,
                    cause: FailureCause::Stale,
                });
            }

            self.dispatch(state, events);
        })
    }

    fn emit_metrics(self: &Arc<Self>) {
        let status = self.state.lock().status();
        debug!(
            active_workers = status.active_workers,
            ready_workers = status.ready_workers,
            queue_length = status.queue_length,
            pending_tasks = status.pending_tasks,
            "Pool metrics"
        );
        self.events.emit(&PoolEvent::Metrics(status));
    }

    fn finish_shutdown(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Stopped {
                return;
            }
            state.phase = Phase::Stopped;
            self.shutdown_tx.send_replace(true);

            for handle in state.background.drain(..) {
                handle.abort();
            }
            for worker in &mut state.workers {
                worker.link_mut().terminate();
            }
            state.workers.clear();
            state.queue.clear();
            state.bindings.clear();
            for entry in state.lifecycle.drain() {
                entry.reject(PoolError::ShuttingDown);
            }
            self.pending_tx.send_replace(0);
        }

        info!("Worker pool stopped");
        self.events.emit(&PoolEvent::Shutdown);
    }

    async fn inbox_loop(
        weak: Weak<Self>,
        mut inbox_rx: InboxReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                received = inbox_rx.recv() => {
                    let Some((worker_id, inbound)) = received else {
                        break;
                    };
                    let Some(shared) = weak.upgrade() else {
                        break;
                    };
                    shared.on_inbound(worker_id, inbound);
                }
                _ = shutdown_rx.changed() => {
                    debug!("Inbox loop: shutdown requested");
                    break;
                }
            }
        }

        debug!("Inbox loop exited");
    }

    async fn periodic_loop(
        name: &'static str,
        weak: Weak<Self>,
        period: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        tick: fn(&Arc<Self>),
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(shared) = weak.upgrade() else {
                        break;
                    };
                    tick(&shared);
                }
                _ = shutdown_rx.changed() => {
                    debug!(loop_name = name, "Periodic loop: shutdown requested");
                    break;
                }
            }
        }

        debug!(loop_name = name, "Periodic loop exited");
    }
}

impl<F: WorkerFactory, P: PriorityLevel> Drop for Shared<F, P> {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);

        let state = self.state.get_mut();
        for handle in state.background.drain(..) {
            handle.abort();
        }
        for worker in &mut state.workers {
            worker.link_mut().terminate();
        }
        for entry in state.lifecycle.drain() {
            entry.reject(PoolError::Closed);
        }
    }
}
