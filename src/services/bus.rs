//! Broadcast bus — fan-out of chat frames to every open connection.
//!
//! DESIGN
//! ======
//! The bus owns the registry of live subscribers: `connection_id` → sender
//! half of that connection's bounded outbound queue. `publish` walks the
//! registry and `try_send`s a clone of the frame to each subscriber, the
//! originating connection included (clients render their own echo).
//!
//! ORDERING
//! ========
//! Each subscriber has exactly one queue. `publish` holds the registry's
//! write lock for its whole fan-out, so concurrent publishes never
//! interleave and every subscriber sees the same publish order. The lock is
//! held only across `try_send`, which never waits.
//!
//! LIFECYCLE
//! =========
//! Created once in `AppState`, drained at shutdown. Draining drops every
//! sender, which ends each connection's receive loop, and refuses new
//! registrations from then on.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;
use uuid::Uuid;

use crate::frame::Frame;

#[derive(Default)]
struct Registry {
    subscribers: HashMap<Uuid, mpsc::Sender<Frame>>,
    draining: bool,
}

/// Shared publish/subscribe registry. Cheap to clone.
#[derive(Clone, Default)]
pub struct BroadcastBus {
    registry: Arc<RwLock<Registry>>,
}

impl BroadcastBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` (and drops `tx`) once the bus is draining.
    pub async fn register(&self, connection_id: Uuid, tx: mpsc::Sender<Frame>) -> bool {
        let mut registry = self.registry.write().await;
        if registry.draining {
            return false;
        }
        registry.subscribers.insert(connection_id, tx);
        true
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub async fn unregister(&self, connection_id: Uuid) -> bool {
        let mut registry = self.registry.write().await;
        registry.subscribers.remove(&connection_id).is_some()
    }

    /// Deliver `frame` to every registered subscriber. Returns how many queues accepted it.
    pub async fn publish(&self, frame: &Frame) -> usize {
        let registry = self.registry.write().await;
        let mut delivered = 0;
        for (connection_id, tx) in &registry.subscribers {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%connection_id, event = %frame.event, "bus: subscriber queue full; dropping frame");
                }
                // Receiver gone; its connection is closing and will unregister itself.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.read().await.subscribers.len()
    }

    /// Stop accepting subscribers and drop all current ones. Returns how many were dropped.
    pub async fn drain(&self) -> usize {
        let mut registry = self.registry.write().await;
        registry.draining = true;
        let dropped = registry.subscribers.len();
        registry.subscribers.clear();
        dropped
    }
}

#[cfg(test)]
#[path = "bus_test.rs"]
mod tests;
