use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::{error, trace};
use uuid::Uuid;

use hustle_types::events::HustleEvent;

/// Capacity of the fan-out channel. Slow clients that fall further behind
/// than this skip ahead and log the lag.
const BROADCAST_CAPACITY: usize = 1024;

/// An event serialized once for every receiver, plus its routing topic.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub meme_id: Option<Uuid>,
    pub json: Arc<str>,
}

/// Fans domain events out to every connected WebSocket client.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events. Each connection holds a receiver.
    broadcast_tx: broadcast::Sender<BroadcastMessage>,

    /// Live connection count.
    connections: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    /// Having no clients connected is not an error.
    pub fn broadcast(&self, event: HustleEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.name(), e);
                return;
            }
        };

        let message = BroadcastMessage {
            meme_id: event.meme_id(),
            json: json.into(),
        };

        let receivers = self.inner.broadcast_tx.send(message).unwrap_or(0);
        trace!("Broadcast {} to {} receivers", event.name(), receivers);
    }

    /// Count a connection as live until the returned slot is dropped.
    pub fn register(&self) -> ConnectionSlot {
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionSlot {
            inner: self.inner.clone(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }
}

pub struct ConnectionSlot {
    inner: Arc<DispatcherInner>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.inner.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let dispatcher = Dispatcher::new();
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();

        let user_id = Uuid::new_v4();
        dispatcher.broadcast(HustleEvent::CreditsUpdated { user_id, credits: 400 });

        for rx in [&mut first, &mut second] {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.meme_id, None);
            let value: serde_json::Value = serde_json::from_str(&msg.json).unwrap();
            assert_eq!(value["type"], "credits_updated");
            assert_eq!(value["data"]["credits"], 400);
        }
    }

    #[test]
    fn broadcast_without_clients_is_fine() {
        let dispatcher = Dispatcher::new();
        dispatcher.broadcast(HustleEvent::MemeDeleted { meme_id: Uuid::new_v4() });
    }

    #[test]
    fn slots_track_live_connections() {
        let dispatcher = Dispatcher::new();
        let a = dispatcher.register();
        let b = dispatcher.register();
        assert_eq!(dispatcher.connection_count(), 2);
        drop(a);
        assert_eq!(dispatcher.connection_count(), 1);
        drop(b);
        assert_eq!(dispatcher.connection_count(), 0);
    }
}
