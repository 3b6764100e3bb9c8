//! Scoped handler registration.

use std::fmt;
use std::sync::Weak;

use crate::bridge::{Bridge, HandlerId};
use crate::protocol::CorrelationId;

/// Unregisters a persistent handler when dropped.
///
/// Only the registration this guard was created for is removed; if another
/// handler has since replaced it for the same id, that one stays. The guard
/// does not keep the bridge alive.
#[must_use = "dropping the guard unregisters the handler immediately"]
pub struct HandlerGuard {
    bridge: Weak<Bridge>,
    id: CorrelationId,
    handler: HandlerId,
}

impl HandlerGuard {
    pub(crate) fn new(bridge: Weak<Bridge>, id: CorrelationId, handler: HandlerId) -> Self {
        Self {
            bridge,
            id,
            handler,
        }
    }

    /// Correlation id the handler listens on.
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Identity of the guarded registration.
    pub fn handler_id(&self) -> HandlerId {
        self.handler
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.unregister_handler_if(self.id.as_str(), self.handler);
        }
    }
}

impl fmt::Debug for HandlerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerGuard")
            .field("id", &self.id)
            .field("handler", &self.handler)
            .finish()
    }
}
