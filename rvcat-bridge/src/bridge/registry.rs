//! Subscription registry keyed by correlation id.
//!
//! Each id owns at most one one-shot callback and at most one persistent
//! handler. Both live in the same slot so a reply is routed with a single
//! lookup. Callbacks are always invoked by the caller after the entry lock
//! has been released.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::protocol::{CorrelationId, Outcome};

/// One-shot reply callback. Invoked at most once.
///
/// `Sync` is required because pending callbacks live in a map shared
/// between consumer tasks and the demultiplexer task.
pub type ReplyCallback = Box<dyn FnOnce(&Outcome) + Send + Sync + 'static>;

/// Persistent reply handler. Invoked for every reply addressed to its id.
pub type ReplyHandler = Arc<dyn Fn(&Outcome) + Send + Sync + 'static>;

/// Identity of one persistent handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

#[derive(Default)]
struct Slot {
    once: Option<ReplyCallback>,
    persistent: Option<(HandlerId, ReplyHandler)>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.once.is_none() && self.persistent.is_none()
    }
}

/// Subscribers taken out of the registry for one reply.
pub struct Subscribers {
    pub once: Option<ReplyCallback>,
    pub persistent: Option<ReplyHandler>,
}

impl Subscribers {
    /// Runs the one-shot callback first, then the persistent handler.
    ///
    /// Returns `(once_fired, persistent_fired)`.
    pub fn deliver(self, outcome: &Outcome) -> (bool, bool) {
        let once_fired = match self.once {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        };
        let persistent_fired = match self.persistent {
            Some(handler) => {
                handler(outcome);
                true
            }
            None => false,
        };
        (once_fired, persistent_fired)
    }
}

/// Concurrent registry of one-shot and persistent subscriptions.
pub struct SubscriptionRegistry {
    slots: DashMap<CorrelationId, Slot>,
    next_handler: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_handler: AtomicU64::new(1),
        }
    }

    /// Installs a one-shot callback, replacing any pending one for `id`.
    ///
    /// Returns true if a pending callback was replaced.
    pub fn install_once(&self, id: CorrelationId, callback: ReplyCallback) -> bool {
        let mut slot = self.slots.entry(id).or_default();
        slot.once.replace(callback).is_some()
    }

    /// Removes a pending one-shot callback. Returns true if one was present.
    pub fn cancel_once(&self, id: &str) -> bool {
        match self.slots.entry(CorrelationId::new(id)) {
            Entry::Occupied(mut occupied) => {
                let removed = occupied.get_mut().once.take().is_some();
                if occupied.get().is_empty() {
                    occupied.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Takes the one-shot callback and clones the persistent handler for `id`.
    ///
    /// The one-shot callback is removed before it is handed out, so a second
    /// reply with the same id finds nothing to call.
    pub fn take_for_dispatch(&self, id: &CorrelationId) -> Subscribers {
        match self.slots.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let once = occupied.get_mut().once.take();
                let persistent = occupied
                    .get()
                    .persistent
                    .as_ref()
                    .map(|(_, handler)| Arc::clone(handler));
                if occupied.get().is_empty() {
                    occupied.remove();
                }
                Subscribers { once, persistent }
            }
            Entry::Vacant(_) => Subscribers {
                once: None,
                persistent: None,
            },
        }
    }

    /// Registers a persistent handler; the last registration for an id wins.
    pub fn register(&self, id: CorrelationId, handler: ReplyHandler) -> HandlerId {
        let handler_id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        let mut slot = self.slots.entry(id).or_default();
        slot.persistent = Some((handler_id, handler));
        handler_id
    }

    /// Removes whichever persistent handler is registered for `id`.
    pub fn unregister(&self, id: &str) -> bool {
        self.remove_persistent(id, |_| true)
    }

    /// Removes the persistent handler for `id` only if it is `handler_id`.
    pub fn unregister_if(&self, id: &str, handler_id: HandlerId) -> bool {
        self.remove_persistent(id, |current| current == handler_id)
    }

    fn remove_persistent(&self, id: &str, matches: impl Fn(HandlerId) -> bool) -> bool {
        match self.slots.entry(CorrelationId::new(id)) {
            Entry::Occupied(mut occupied) => {
                let is_match = occupied
                    .get()
                    .persistent
                    .as_ref()
                    .is_some_and(|(current, _)| matches(*current));
                if !is_match {
                    return false;
                }
                occupied.get_mut().persistent = None;
                if occupied.get().is_empty() {
                    occupied.remove();
                }
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Returns true if a persistent handler is registered for `id`.
    pub fn has_handler(&self, id: &str) -> bool {
        self.slots
            .get(id)
            .is_some_and(|slot| slot.persistent.is_some())
    }

    /// Number of one-shot callbacks still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.once.is_some()).count()
    }

    /// Drops every pending one-shot callback. Persistent handlers stay.
    ///
    /// Returns the number of callbacks dropped.
    pub fn clear_once(&self) -> usize {
        let mut dropped = Vec::new();
        self.slots.retain(|_, slot| {
            if let Some(callback) = slot.once.take() {
                dropped.push(callback);
            }
            !slot.is_empty()
        });
        // Dropped outside retain so callback destructors never run under a shard lock.
        let count = dropped.len();
        drop(dropped);
        count
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("ids", &self.slots.len())
            .field("pending", &self.pending_count())
            .finish()
    }
}
