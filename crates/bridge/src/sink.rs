//! The broadcast callback the core needs to forward program events to
//! connected clients: a callback for broadcasting state updates.

use crate::event::BridgeEvent;
use tokio::sync::broadcast;

/// The collaborator the core hands its events to. Kept as a trait so a
/// test harness can substitute an in-memory sink with no network attached.
pub trait EventSink: Send + Sync {
    /// Publish an event to every currently connected client. Lagging or
    /// absent subscribers must not block or fail the publisher.
    fn publish(&self, event: BridgeEvent);
}

/// The default [`EventSink`]: a `tokio::sync::broadcast` channel. Clients
/// subscribe with [`BroadcastEventSink::subscribe`] and receive every event
/// published from the moment they subscribe onward; a slow client that
/// falls behind the channel's capacity sees `RecvError::Lagged` rather than
/// stalling the publisher, matching the channel's own semantics.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<BridgeEvent>,
}

impl BroadcastEventSink {
    /// A sink buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe a new client, receiving events published from this point
    /// onward.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: BridgeEvent) {
        // No subscribers is the common case between protocol runs; the
        // channel reports it as an error we can safely ignore.
        let _ = self.sender.send(event);
    }
}
