//! Event bus for broadcasting routing events to subscribers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::event::RuntimeEvent;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Event bus for broadcasting routing events to all subscribers.
///
/// Events are delivered through a broadcast channel, asynchronously and in
/// order; a receiver that falls behind skips the overwritten events and is
/// told how many it missed.
#[derive(Debug)]
pub struct RuntimeEventBus {
    /// Sender for broadcasting events.
    sender: broadcast::Sender<Arc<RuntimeEvent>>,
    /// Channel capacity.
    capacity: usize,
}

impl RuntimeEventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    pub fn publish(&self, event: RuntimeEvent) -> usize {
        let event = Arc::new(event);

        trace!(event_type = %event.event_type(), "publishing event");

        if let Ok(count) = self.sender.send(event.clone()) {
            debug!(
                event_type = %event.event_type(),
                receiver_count = count,
                "event published"
            );
            count
        } else {
            trace!(event_type = %event.event_type(), "no receivers for event");
            0
        }
    }

    /// Subscribe to events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RuntimeEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for events from the bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<RuntimeEvent>>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Arc<RuntimeEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "event receiver lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive the next event without blocking.
    pub fn try_recv(&mut self) -> Option<Arc<RuntimeEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "event receiver lagged, events dropped");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}
