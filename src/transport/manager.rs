//! Connection ownership and event reporting.
//!
//! One manager instance per process composition root, constructed explicitly
//! and passed by handle to whatever needs it. Everything that can go wrong on
//! a connection funnels into the manager's event channel; nothing is thrown
//! across task boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::core::frame::Frame;
use crate::error::{ProtocolError, Result};
use crate::transport::dispatcher::Dispatcher;

/// Identifier generated for each accepted connection.
pub type ConnectionId = u64;

/// Events surfaced to the manager's owner.
#[derive(Debug)]
pub enum ManagerEvent {
    /// A connection completed authentication.
    Authenticated(ConnectionId),
    /// A connection went away, gracefully or not.
    Disconnected(ConnectionId),
    /// A connection-scoped fault. The connection named here has already been
    /// torn down; sibling connections are unaffected.
    ConnectionError {
        connection: ConnectionId,
        error: ProtocolError,
    },
}

/// Write-side handle to a live connection, kept in the manager's map. The
/// read loop and session live in the connection's own task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Frame>) -> Self {
        Self { id, outbound }
    }

    /// Queue a frame for the connection's writer. Fails with
    /// [`ProtocolError::ConnectionClosed`] once the connection's task is gone.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

/// Owns the live-connection map and the handler registry.
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    dispatcher: Dispatcher,
    next_id: AtomicU64,
    events: mpsc::UnboundedSender<ManagerEvent>,
}

impl ConnectionManager {
    /// Build a manager plus the receiving end of its event channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ManagerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                connections: RwLock::new(HashMap::new()),
                dispatcher: Dispatcher::new(),
                next_id: AtomicU64::new(1),
                events,
            }),
            events_rx,
        )
    }

    /// Register an application handler. Setup-time; duplicate or reserved ids
    /// should abort startup.
    pub fn register_handler<F>(&self, packet_id: u8, handler: F) -> Result<()>
    where
        F: Fn(ConnectionId, Frame) -> crate::transport::dispatcher::HandlerFuture
            + Send
            + Sync
            + 'static,
    {
        self.dispatcher.register(packet_id, handler)
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn insert(&self, handle: ConnectionHandle) {
        let id = handle.id;
        self.connections.write().await.insert(id, handle);
        debug!(connection = id, "Connection registered");
    }

    /// Drop a connection from the map. The session dies with the connection
    /// task; this only forgets the write handle.
    pub async fn remove(&self, id: ConnectionId) {
        if self.connections.write().await.remove(&id).is_some() {
            debug!(connection = id, "Connection removed");
            self.emit(ManagerEvent::Disconnected(id));
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a frame to one live connection. On an authenticated connection
    /// the writer encrypts plaintext frames before they reach the wire.
    pub async fn send_to(&self, id: ConnectionId, frame: Frame) -> Result<()> {
        let handle = {
            let connections = self.connections.read().await;
            connections
                .get(&id)
                .cloned()
                .ok_or(ProtocolError::ConnectionClosed)?
        };
        handle.send(frame).await
    }

    /// Route an authenticated frame to its application handler. The handler
    /// runs in its own task so a slow handler never stalls the connection's
    /// reassembly loop; failures come back as events.
    pub fn dispatch_frame(self: &Arc<Self>, connection: ConnectionId, frame: Frame) -> Result<()> {
        let packet_id = frame.id;
        let future = self.dispatcher.dispatch(connection, frame)?;

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = future.await {
                warn!(connection, packet_id, %error, "Handler failed");
                manager.emit(ManagerEvent::ConnectionError { connection, error });
            }
        });
        Ok(())
    }

    pub fn emit(&self, event: ManagerEvent) {
        // The receiver dropping just means nobody is listening anymore.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn insert_send_remove() {
        let (manager, mut events) = ConnectionManager::new();
        let (tx, mut rx) = mpsc::channel(4);

        let id = manager.next_connection_id();
        manager.insert(ConnectionHandle::new(id, tx)).await;
        assert_eq!(manager.connection_count().await, 1);

        let frame = Frame {
            id: 0x44,
            payload: b"hi".to_vec(),
            encrypted: false,
        };
        manager.send_to(id, frame.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), frame);

        manager.remove(id).await;
        assert_eq!(manager.connection_count().await, 0);
        assert!(matches!(
            events.recv().await,
            Some(ManagerEvent::Disconnected(_))
        ));

        assert!(matches!(
            manager.send_to(id, frame).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn handler_error_becomes_event() {
        let (manager, mut events) = ConnectionManager::new();
        manager
            .register_handler(0x50, |_conn, _frame| {
                async { Err(ProtocolError::DecryptionFailure) }.boxed()
            })
            .unwrap();

        manager
            .dispatch_frame(
                3,
                Frame {
                    id: 0x50,
                    payload: vec![],
                    encrypted: false,
                },
            )
            .unwrap();

        match events.recv().await.unwrap() {
            ManagerEvent::ConnectionError { connection, error } => {
                assert_eq!(connection, 3);
                assert!(matches!(error, ProtocolError::DecryptionFailure));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        let (manager, _events) = ConnectionManager::new();
        let a = manager.next_connection_id();
        let b = manager.next_connection_id();
        assert_ne!(a, b);
    }
}
