//! Event publication
//!
//! [`EventBus`] is a small synchronous pub/sub keyed by event kind. The pool
//! publishes [`PoolEvent`]s on it; subscribe by [`PoolEventKind`].

mod bus;
mod pool_event;

pub use bus::{BusEvent, EventBus, HandlerId};
pub use pool_event::{PoolEvent, PoolEventKind};
