use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

struct Connection {
    id: Uuid,
    outbound: mpsc::UnboundedSender<String>,
}

/// Live WebSocket connections keyed by session id. Owned by the transport
/// layer and shared through application state.
///
/// A session holds at most one connection; registering again replaces the
/// previous one, whose outbound channel is then closed.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its id with the receiving half of
    /// its outbound queue.
    pub fn register(&self, session_id: &str) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        if let Some(previous) = self
            .connections
            .insert(session_id.to_string(), Connection { id, outbound })
        {
            debug!(
                "Session {} connection {} replaced by {}",
                session_id, previous.id, id
            );
        }

        (id, receiver)
    }

    /// Remove the session's connection if it is still `connection_id`
    pub fn unregister(&self, session_id: &str, connection_id: Uuid) -> bool {
        self.connections
            .remove_if(session_id, |_, conn| conn.id == connection_id)
            .is_some()
    }

    pub fn connection_id(&self, session_id: &str) -> Option<Uuid> {
        self.connections.get(session_id).map(|conn| conn.id)
    }

    /// Queue a frame for the session's current connection
    pub fn send(&self, session_id: &str, payload: String) -> bool {
        let Some(conn) = self.connections.get(session_id) else {
            return false;
        };
        if conn.outbound.send(payload).is_err() {
            warn!("Connection {} for session {} is closed", conn.id, session_id);
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_send_unregister() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = registry.register("s1");

        assert_eq!(registry.connection_id("s1"), Some(id));
        assert!(registry.send("s1", "halo".to_string()));
        assert_eq!(rx.recv().await.as_deref(), Some("halo"));

        assert!(registry.unregister("s1", id));
        assert_eq!(registry.connection_id("s1"), None);
        assert!(!registry.send("s1", "lost".to_string()));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_and_stale_unregister_is_ignored() {
        let registry = ConnectionRegistry::new();
        let (old_id, mut old_rx) = registry.register("s1");
        let (new_id, mut new_rx) = registry.register("s1");

        // replaced sender is dropped
        assert_eq!(old_rx.recv().await, None);

        assert!(!registry.unregister("s1", old_id));
        assert_eq!(registry.connection_id("s1"), Some(new_id));

        assert!(registry.send("s1", "hi".to_string()));
        assert_eq!(new_rx.recv().await.as_deref(), Some("hi"));
        assert_eq!(registry.len(), 1);
    }
}
