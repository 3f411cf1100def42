//! Priority task queue
//!
//! This module provides:
//! - [`PriorityTaskQueue`] - Multi-level FIFO with head-of-line reinsertion
//! - [`PriorityLevel`] - The closed set of levels a pool schedules by
//! - [`Priority`] - Default high/medium/low levels

mod priority;
mod task_queue;

pub use priority::{ParsePriorityError, Priority, PriorityLevel};
pub use task_queue::{Prioritized, PriorityTaskQueue, QueueError};
