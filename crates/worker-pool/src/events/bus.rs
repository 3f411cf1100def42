//! Typed publish/subscribe bus

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// An event that can be published on an [`EventBus`]
pub trait BusEvent: Send + Sync + 'static {
    /// Discriminant handlers subscribe to
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Identifies one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;
type HandlerList<E> = Vec<(HandlerId, Handler<E>)>;

/// Synchronous event bus
///
/// Handlers for a kind run in registration order, on the emitting thread.
/// A snapshot of the handler list is taken before invoking anything, so a
/// handler may subscribe or unsubscribe without deadlocking; changes apply
/// from the next `emit`. Panics in handlers propagate to the emitter.
pub struct EventBus<E: BusEvent> {
    handlers: RwLock<HashMap<E::Kind, HandlerList<E>>>,
    next_id: AtomicU64,
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for `kind`
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one handler, or every handler for `kind` when `id` is `None`
    ///
    /// Returns the number of handlers removed.
    pub fn off(&self, kind: E::Kind, id: Option<HandlerId>) -> usize {
        let mut handlers = self.handlers.write();
        match id {
            None => handlers.remove(&kind).map_or(0, |list| list.len()),
            Some(id) => {
                let Some(list) = handlers.get_mut(&kind) else {
                    return 0;
                };
                let before = list.len();
                list.retain(|(handler_id, _)| *handler_id != id);
                let removed = before - list.len();
                if list.is_empty() {
                    handlers.remove(&kind);
                }
                removed
            }
        }
    }

    /// Invoke every handler currently registered for the event's kind
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = match self.handlers.read().get(&event.kind()) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };

        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of handlers registered for `kind`
    pub fn handler_count(&self, kind: E::Kind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<E::Kind, usize> = self
            .handlers
            .read()
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
