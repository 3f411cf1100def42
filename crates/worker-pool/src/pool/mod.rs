//! Task scheduling over a set of workers
//!
//! This module provides:
//! - [`WorkerPool`] - Priority scheduler with retries, timeouts and worker replacement
//! - [`TaskHandle`] - Future resolving to a task's outcome
//! - [`WorkerPoolConfig`] - Pool sizing, timeouts and intervals
//! - [`PoolStatus`] - Point-in-time snapshot for monitoring
//!
//! # Task lifecycle
//!
//! ```text
//! submit ──> queued ──dispatch──> bound ──reply ok──> completed
//!              ^                    │
//!              │   retries left     │ error reply / timeout /
//!              └────(head of level)─┤ send failure / worker fault
//!                                   │
//!                                   └──no retries left──> failed
//! ```

mod config;
mod error;
mod handle;
mod lifecycle;
mod status;
mod worker_pool;

pub use config::WorkerPoolConfig;
pub use error::{FailureCause, PoolError};
pub use handle::TaskHandle;
pub use status::PoolStatus;
pub use worker_pool::{Readiness, WorkerPool};
