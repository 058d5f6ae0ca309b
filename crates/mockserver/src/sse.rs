//! Low-level server-sent-event plumbing: a broker fans pre-serialized
//! events out to its registered client connections. Each client has its own
//! channel, so concurrent publishers never interleave within one event, and
//! dropping a connection (the HTTP layer does this when the peer goes away)
//! unregisters it from the broker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct Broker {
    clients: Mutex<HashMap<Uuid, mpsc::UnboundedSender<Arc<str>>>>,
}

impl Broker {
    pub fn new() -> Arc<Broker> {
        Arc::new(Broker {
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// Register a new client connection under a fresh id.
    pub fn subscribe(self: &Arc<Broker>) -> ClientConn {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().insert(id, sender);
        ClientConn {
            id,
            receiver,
            broker: Arc::downgrade(self),
        }
    }

    /// Write one pre-serialized event to every live connection, pruning
    /// connections whose receiving side is gone. Returns the number of
    /// connections written to.
    pub fn publish(&self, payload: &Arc<str>) -> usize {
        let mut clients = self.lock();
        clients.retain(|_, sender| sender.send(payload.clone()).is_ok());
        clients.len()
    }

    /// Drop every connection; their streams end.
    pub fn close(&self) {
        self.lock().clear();
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, mpsc::UnboundedSender<Arc<str>>>> {
        self.clients.lock().expect("broker lock poisoned")
    }
}

/// One client connection: a stream of serialized events that lives until
/// the broker closes or the connection is dropped.
pub struct ClientConn {
    id: Uuid,
    receiver: mpsc::UnboundedReceiver<Arc<str>>,
    broker: Weak<Broker>,
}

impl ClientConn {
    pub fn client_id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }
}

impl futures::Stream for ClientConn {
    type Item = Arc<str>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for ClientConn {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.lock().remove(&self.id);
            tracing::info!(client = %self.id, "sse client disconnected");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_client() {
        let broker = Broker::new();
        let mut first = broker.subscribe();
        let mut second = broker.subscribe();

        let payload: Arc<str> = Arc::from(r#"{"n":1}"#);
        assert_eq!(broker.publish(&payload), 2);

        assert_eq!(first.recv().await.as_deref(), Some(r#"{"n":1}"#));
        assert_eq!(second.recv().await.as_deref(), Some(r#"{"n":1}"#));
    }

    #[tokio::test]
    async fn test_drop_unregisters_client() {
        let broker = Broker::new();
        let conn = broker.subscribe();
        assert_eq!(broker.client_count(), 1);

        drop(conn);
        assert_eq!(broker.client_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let broker = Broker::new();
        let mut conn = broker.subscribe();
        broker.close();
        assert_eq!(conn.recv().await, None);
    }
}
