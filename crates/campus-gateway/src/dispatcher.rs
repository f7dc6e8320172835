use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use campus_types::events::GatewayEvent;

pub type ConnectionId = Uuid;

/// Events a connection may have queued before further ones are dropped.
pub const CONNECTION_QUEUE_CAPACITY: usize = 256;

/// Live broadcast channel. Holds the set of joined connections and fans every
/// published event out to all of them, the publisher included.
///
/// Membership changes only through `join`/`leave`; `publish` takes the
/// registry read-only. A connection that leaves while a publish is in flight
/// may or may not see that event. Delivery is best-effort: a connection
/// whose queue is full misses the event instead of holding up the others.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// conn_id -> outbound queue of that connection
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<GatewayEvent>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Add a connection to the fan-out set. Events published from now on are
    /// queued on the returned receiver; nothing earlier is replayed.
    /// Joining again with the same id replaces the previous queue.
    pub async fn join(&self, conn_id: ConnectionId) -> mpsc::Receiver<GatewayEvent> {
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);
        self.inner.connections.write().await.insert(conn_id, tx);
        debug!("Connection {} joined the broadcast channel", conn_id);
        rx
    }

    /// Remove a connection. Returns false if it was not joined.
    pub async fn leave(&self, conn_id: ConnectionId) -> bool {
        let removed = self.inner.connections.write().await.remove(&conn_id).is_some();
        if removed {
            debug!("Connection {} left the broadcast channel", conn_id);
        }
        removed
    }

    /// Deliver `event` to every joined connection without waiting on any of
    /// them. Returns how many queues accepted it.
    pub async fn publish(&self, event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for (conn_id, tx) in connections.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Connection {} queue full, dropping event", conn_id);
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("Connection {} queue closed, skipping", conn_id);
                }
            }
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
