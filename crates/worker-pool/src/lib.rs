//! # Worker Pool
//!
//! A priority task scheduler that dispatches work to a fixed set of workers
//! reached over message channels.
//!
//! ## Features
//!
//! - **Priority scheduling**: Strict precedence across levels, FIFO within a level
//! - **Bounded retries**: Timeouts, error replies, send failures and worker faults
//!   all share one retry budget; retries jump to the head of their level
//! - **Worker replacement**: A faulted worker is terminated and started fresh
//! - **Readiness handshake**: Workers receive tasks only after announcing readiness
//! - **Events**: Completions, retries, failures, queue pressure and periodic metrics
//! - **Graceful shutdown**: Outstanding work drains before workers stop
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  (submit, dispatch, retry-or-fail, timers, stale sweep)      │
//! └─────────────────────────────────────────────────────────────┘
//!        │                     │                        │
//!        ▼                     ▼                        ▼
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────────────┐
//! │ PriorityTask │   │ TaskLifecycleTable │   │ EventBus         │
//! │ Queue        │   │ (one entry / task) │   │ (PoolEvent)      │
//! └──────────────┘   └────────────────────┘   └──────────────────┘
//!        │
//!        ▼  frame / post                     reply / system / fault
//! ┌─────────────────────────────────────────────────────────────┐
//! │            WorkerLink  ◄──────────────►  WorkerInbox         │
//! │  (one per worker, started by a WorkerFactory)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use worker_pool::prelude::*;
//!
//! let factory = HandlerWorkerFactory::new();
//! factory.register_handler("thumbnail", |request| async move {
//!     let size = request.payload.data["size"].as_u64().unwrap_or(64);
//!     Ok(json!({ "size": size }))
//! });
//!
//! let pool: WorkerPool<_> = WorkerPool::new(
//!     factory,
//!     WorkerPoolConfig::default().with_worker_count(4),
//! )?;
//!
//! let result = pool
//!     .submit("thumbnail", json!({ "size": 128 }), Priority::High)
//!     .await?;
//!
//! pool.shutdown().await?;
//! ```

pub mod events;
pub mod pool;
pub mod queue;
pub mod task;
pub mod telemetry;
pub mod worker;

mod util;

/// Prelude for common imports
pub mod prelude {
    pub use crate::events::{EventBus, PoolEvent, PoolEventKind};
    pub use crate::pool::{
        FailureCause, PoolError, PoolStatus, TaskHandle, WorkerPool, WorkerPoolConfig,
    };
    pub use crate::queue::{Priority, PriorityLevel};
    pub use crate::task::{Payload, TaskId, TaskSuccess};
    pub use crate::worker::{
        HandlerWorkerFactory, SystemMessage, TaskRequest, WorkerFactory, WorkerInbox, WorkerLink,
    };
}

// Re-export key types at crate root
pub use events::{BusEvent, EventBus, HandlerId, PoolEvent, PoolEventKind};
pub use pool::{FailureCause, PoolError, PoolStatus, TaskHandle, WorkerPool, WorkerPoolConfig};
pub use queue::{Priority, PriorityLevel, PriorityTaskQueue};
pub use task::{Payload, Task, TaskId, TaskMetrics, TaskSuccess};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
pub use worker::{
    HandlerWorkerFactory, LinkError, SystemMessage, TaskRequest, WorkerFactory, WorkerId,
    WorkerInbox, WorkerLink, WorkerMessage,
};
