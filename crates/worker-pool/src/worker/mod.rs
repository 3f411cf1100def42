//! Workers and the transport that reaches them
//!
//! This module provides:
//! - [`WorkerFactory`] / [`WorkerLink`] - How the pool starts and talks to workers
//! - [`WorkerInbox`] - How workers talk back
//! - [`frame`] / [`unframe`] - Task framing with zero-copy attachments
//! - [`WorkerContext`] - Per-worker state and metrics kept by the pool
//! - [`HandlerWorkerFactory`] - In-process workers driven by async handlers
//!
//! # Protocol
//!
//! ```text
//! worker                         pool
//!   | -- system {kind: ready} ---> |   mark ready, dispatch
//!   | <--------- framed task ----- |
//!   | -- reply {task_id, ...} ---> |   resolve or retry, dispatch
//!   | -- fault ------------------> |   fail bound task, replace worker
//! ```

mod context;
mod framing;
mod handler;
mod link;
mod message;

pub use context::{WorkerContext, WorkerId, WorkerMetrics, WorkerStatus};
pub use framing::{frame, unframe, FramedMessage, TaskRequest, WireMessage};
pub use handler::{HandlerLink, HandlerResult, HandlerWorkerFactory, TaskHandler};
pub use link::{LinkError, WorkerFactory, WorkerInbox, WorkerLink};
pub use message::{ReplyOutcome, SystemMessage, TaskReply, WorkerMessage, READY_KIND};

pub(crate) use link::Inbound;
