//! Transport seam between the pool and its workers
//!
//! A [`WorkerFactory`] starts workers; each started worker is represented by
//! a [`WorkerLink`] the pool posts framed tasks into. Everything a worker
//! sends back travels through its [`WorkerInbox`], tagged with the worker's
//! id so the pool can attribute it.

use tokio::sync::mpsc;

use super::context::WorkerId;
use super::framing::FramedMessage;
use super::message::{SystemMessage, TaskReply, WorkerMessage};

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The worker side is gone
    #[error("worker link closed")]
    Closed,

    /// The worker could not be started
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// A message could not be delivered
    #[error("failed to send to worker: {0}")]
    Send(String),
}

/// What arrives in the pool's inbox
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(WorkerMessage),
    Fault(String),
}

/// The worker's way back to the pool
#[derive(Debug, Clone)]
pub struct WorkerInbox {
    worker_id: WorkerId,
    tx: mpsc::UnboundedSender<(WorkerId, Inbound)>,
}

impl WorkerInbox {
    pub(crate) fn new(worker_id: WorkerId, tx: mpsc::UnboundedSender<(WorkerId, Inbound)>) -> Self {
        Self { worker_id, tx }
    }

    /// Id of the worker owning this inbox
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Deliver a message to the pool
    pub fn send(&self, message: WorkerMessage) -> Result<(), LinkError> {
        self.push(Inbound::Message(message))
    }

    /// Deliver a task reply
    pub fn reply(&self, reply: TaskReply) -> Result<(), LinkError> {
        self.send(WorkerMessage::Reply(reply))
    }

    /// Deliver a system message
    pub fn system(&self, message: SystemMessage) -> Result<(), LinkError> {
        self.send(WorkerMessage::System(message))
    }

    /// Announce the worker is ready for tasks
    pub fn ready(&self) -> Result<(), LinkError> {
        self.system(SystemMessage::ready())
    }

    /// Report an uncaught failure; the pool replaces the worker
    pub fn fault(&self, error: impl Into<String>) -> Result<(), LinkError> {
        self.push(Inbound::Fault(error.into()))
    }

    fn push(&self, inbound: Inbound) -> Result<(), LinkError> {
        self.tx
            .send((self.worker_id, inbound))
            .map_err(|_| LinkError::Closed)
    }
}

/// Pool-side handle to one running worker
pub trait WorkerLink: Send + 'static {
    /// Post a framed task; must not block
    fn post(&mut self, message: FramedMessage) -> Result<(), LinkError>;

    /// Stop the worker; further posts may fail
    fn terminate(&mut self);
}

/// Starts workers for a pool
pub trait WorkerFactory: Send + Sync + 'static {
    type Link: WorkerLink;

    /// Start a worker reporting to `inbox`
    fn spawn(&self, inbox: WorkerInbox) -> Result<Self::Link, LinkError>;
}
