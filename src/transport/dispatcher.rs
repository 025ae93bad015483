//! Frame dispatcher with packet-id routing.
//!
//! Handlers are async and owned per dispatcher instance, not per type: each
//! manager builds its own registry at startup. Registering an id twice is a
//! programming error and fails loudly then, not at dispatch time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;

use crate::auth::packet::is_handshake_id;
use crate::core::frame::{Frame, RESERVED_IDS};
use crate::error::{ProtocolError, Result};
use crate::transport::manager::ConnectionId;

/// Future returned by an application handler.
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

type HandlerFn = dyn Fn(ConnectionId, Frame) -> HandlerFuture + Send + Sync;

/// Packet-id to handler registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<u8, Arc<HandlerFn>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an application packet id.
    ///
    /// # Errors
    /// - [`ProtocolError::ReservedPacketId`] for goodbye ids, the encrypted
    ///   marker, and handshake ids (those route internally).
    /// - [`ProtocolError::DuplicateHandler`] if the id is already taken. This
    ///   guards against accidental double-registration; it is not a
    ///   conflict-resolution policy.
    pub fn register<F>(&self, packet_id: u8, handler: F) -> Result<()>
    where
        F: Fn(ConnectionId, Frame) -> HandlerFuture + Send + Sync + 'static,
    {
        if RESERVED_IDS.contains(&packet_id) || is_handshake_id(packet_id) {
            return Err(ProtocolError::ReservedPacketId(packet_id));
        }

        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::Storage("dispatcher lock poisoned".into()))?;

        if handlers.contains_key(&packet_id) {
            return Err(ProtocolError::DuplicateHandler(packet_id));
        }
        handlers.insert(packet_id, Arc::new(handler));
        Ok(())
    }

    /// Look up the handler for a frame and return its future for the caller
    /// to spawn. Keeping the spawn at the call site lets the manager decide
    /// where handler errors are reported.
    pub fn dispatch(&self, connection: ConnectionId, frame: Frame) -> Result<HandlerFuture> {
        let handler = {
            let handlers = self
                .handlers
                .read()
                .map_err(|_| ProtocolError::Storage("dispatcher lock poisoned".into()))?;
            handlers
                .get(&frame.id)
                .cloned()
                .ok_or(ProtocolError::UnexpectedPacket(frame.id))?
        };
        Ok(handler(connection, frame))
    }

    /// Whether any handler is registered for `packet_id`.
    pub fn is_registered(&self, packet_id: u8) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(&packet_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::packet::id as auth_id;
    use crate::core::frame::{ID_CLIENT_GOODBYE, ID_SERVER_GOODBYE};
    use futures::FutureExt;

    fn noop(_conn: ConnectionId, _frame: Frame) -> HandlerFuture {
        async { Ok(()) }.boxed()
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let dispatcher = Dispatcher::new();
        dispatcher.register(0x40, noop).unwrap();

        assert!(matches!(
            dispatcher.register(0x40, noop),
            Err(ProtocolError::DuplicateHandler(0x40))
        ));
    }

    #[test]
    fn reserved_and_handshake_ids_rejected() {
        let dispatcher = Dispatcher::new();
        for id in [
            ID_SERVER_GOODBYE,
            ID_CLIENT_GOODBYE,
            0x01,
            auth_id::CLIENT_INITIAL_AUTH,
            auth_id::SERVER_AUTH_PROOF,
        ] {
            assert!(matches!(
                dispatcher.register(id, noop),
                Err(ProtocolError::ReservedPacketId(_))
            ));
        }
    }

    #[tokio::test]
    async fn dispatch_runs_registered_handler() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<(ConnectionId, u8)>();
        let tx = std::sync::Mutex::new(Some(tx));

        dispatcher
            .register(0x42, move |conn, frame| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send((conn, frame.id));
                }
                async { Ok(()) }.boxed()
            })
            .unwrap();

        let fut = dispatcher
            .dispatch(
                9,
                Frame {
                    id: 0x42,
                    payload: vec![],
                    encrypted: false,
                },
            )
            .unwrap();
        fut.await.unwrap();

        assert_eq!(rx.await.unwrap(), (9, 0x42));
    }

    #[test]
    fn unknown_id_is_unexpected_packet() {
        let dispatcher = Dispatcher::new();
        let result = dispatcher.dispatch(
            1,
            Frame {
                id: 0x60,
                payload: vec![],
                encrypted: false,
            },
        );
        assert!(matches!(result, Err(ProtocolError::UnexpectedPacket(0x60))));
    }
}
