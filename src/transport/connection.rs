//! Server-side per-connection loop.
//!
//! One task per accepted socket: reassemble frames off the wire, drive the
//! handshake until the session authenticates, then hand application frames to
//! the dispatcher. Any protocol fault tears down this connection only.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::handshake::{self, ServerAuthState};
use crate::auth::packet::{self, id as auth_id};
use crate::core::codec::FrameCodec;
use crate::core::frame::{self, Frame, ID_CLIENT_GOODBYE, ID_SERVER_GOODBYE};
use crate::error::{constants, ProtocolError, Result};
use crate::session::{Session, SessionState};
use crate::store::{CredentialCache, UserRecord};
use crate::transport::manager::{ConnectionHandle, ConnectionId, ConnectionManager, ManagerEvent};

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 32;

/// Serve one accepted connection to completion.
///
/// Returns when the peer disconnects, a goodbye completes, or a fatal
/// protocol error ends the session. The connection is removed from the
/// manager on every exit path.
#[instrument(skip_all, fields(connection = tracing::field::Empty))]
pub async fn serve(
    stream: TcpStream,
    manager: Arc<ConnectionManager>,
    cache: Arc<CredentialCache>,
    goodbye_timeout: Duration,
) {
    let id = manager.next_connection_id();
    tracing::Span::current().record("connection", id);

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    manager.insert(ConnectionHandle::new(id, outbound_tx)).await;

    let mut conn = Connection {
        id,
        framed: Framed::new(stream, FrameCodec),
        session: Session::new(id),
        pending_auth: None,
        manager: Arc::clone(&manager),
        cache,
        goodbye_timeout,
    };
    // The accepted socket is live; the session is bound to it.
    conn.session.set_state(SessionState::Connected);

    if let Err(error) = conn.run(outbound_rx).await {
        // Framing and decryption faults are both fatal, but logged apart so
        // operators can tell a corrupt stream from a bad cipher.
        match &error {
            ProtocolError::DecryptionFailure => {
                error!(connection = id, "Dropping connection: decryption failed")
            }
            ProtocolError::InvalidHeader
            | ProtocolError::TruncatedFrame { .. }
            | ProtocolError::OversizedFrame(_) => {
                warn!(connection = id, %error, "Dropping connection: framing error")
            }
            ProtocolError::AuthenticationFailed => {
                info!(connection = id, "Dropping connection: authentication failed")
            }
            _ => warn!(connection = id, %error, "Dropping connection"),
        }
        manager.emit(ManagerEvent::ConnectionError {
            connection: id,
            error,
        });
    }

    conn.session.close();
    manager.remove(id).await;
}

struct Connection {
    id: ConnectionId,
    framed: Framed<TcpStream, FrameCodec>,
    session: Session,
    /// Server handshake state retained between challenge and proof.
    pending_auth: Option<ServerAuthState>,
    manager: Arc<ConnectionManager>,
    cache: Arc<CredentialCache>,
    goodbye_timeout: Duration,
}

enum Flow {
    Continue,
    Shutdown,
}

impl Connection {
    async fn run(&mut self, mut outbound_rx: mpsc::Receiver<Frame>) -> Result<()> {
        loop {
            tokio::select! {
                incoming = self.framed.next() => {
                    match incoming {
                        Some(Ok(frame)) => {
                            if let Flow::Shutdown = self.handle_frame(frame).await? {
                                return Ok(());
                            }
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            debug!(connection = self.id, "Peer closed the transport");
                            return Ok(());
                        }
                    }
                }
                outgoing = outbound_rx.recv() => {
                    match outgoing {
                        Some(frame) => {
                            let frame = self.seal(frame)?;
                            self.framed.send(frame).await?;
                        }
                        // Manager dropped the handle; shut down quietly.
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Encrypt a queued outbound frame with the session cipher. Goodbye
    /// frames and anything queued before authentication pass through as-is.
    fn seal(&self, frame: Frame) -> Result<Frame> {
        if frame.encrypted
            || frame.id == ID_SERVER_GOODBYE
            || frame.id == ID_CLIENT_GOODBYE
            || !self.session.is_authenticated()
        {
            return Ok(frame);
        }
        Frame::seal(frame.id, &frame.payload, self.session.envelope()?)
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<Flow> {
        if frame.id == ID_CLIENT_GOODBYE {
            return self.handle_goodbye(&frame).await;
        }

        if self.session.is_authenticated() {
            self.handle_application(frame)
        } else {
            self.handle_handshake(frame).await
        }
    }

    /// Peer announced disconnect intent: acknowledge and stop.
    async fn handle_goodbye(&mut self, frame: &Frame) -> Result<Flow> {
        let timeout = frame::decode_goodbye_timeout(&frame.payload).unwrap_or(0);
        debug!(connection = self.id, timeout, "Client goodbye received");

        let ack = Frame {
            id: ID_SERVER_GOODBYE,
            payload: (self.goodbye_timeout.as_secs() as u32).to_le_bytes().to_vec(),
            encrypted: false,
        };
        self.framed.send(ack).await?;
        Ok(Flow::Shutdown)
    }

    /// Frames on a connection that has not authenticated yet: handshake ids
    /// only, always plaintext.
    async fn handle_handshake(&mut self, frame: Frame) -> Result<Flow> {
        if frame.encrypted {
            return Err(ProtocolError::UnexpectedPacket(frame.id));
        }

        match frame.id {
            auth_id::CLIENT_SIGNUP => {
                let signup: packet::ClientSignup = packet::from_frame(&frame)?;
                let username = signup.username.clone();
                let created = self
                    .cache
                    .add_user(UserRecord {
                        username: signup.username,
                        salt: signup.salt,
                        verifier: signup.verifier,
                    })
                    .await?;
                info!(connection = self.id, %username, created, "Signup processed");
                Ok(Flow::Continue)
            }

            auth_id::CLIENT_INITIAL_AUTH => {
                let initial: packet::ClientInitialAuth = packet::from_frame(&frame)?;

                // Unknown user takes the identical exit as a bad proof:
                // silent close, no hint which one it was.
                let user = self
                    .cache
                    .get_user(&initial.username)
                    .await?
                    .ok_or(ProtocolError::AuthenticationFailed)?;

                let (state, challenge) = handshake::server_respond(&user, &initial)?;
                self.pending_auth = Some(state);
                self.session.set_state(SessionState::AwaitingProof);

                self.framed
                    .send(packet::to_frame(
                        auth_id::SERVER_INITIAL_AUTH_RESPONSE,
                        &challenge,
                    )?)
                    .await?;
                Ok(Flow::Continue)
            }

            auth_id::CLIENT_AUTH_PROOF => {
                let proof: packet::ClientAuthProof = packet::from_frame(&frame)?;
                let state = self
                    .pending_auth
                    .take()
                    .ok_or(ProtocolError::AuthenticationFailed)?;

                let (args, reply) = handshake::server_verify(state, &proof)?;
                self.session.promote(args)?;

                // The proof reply goes out encrypted: decrypting it is the
                // client's evidence that both sides share a working cipher.
                let body = bincode::serialize(&reply)?;
                let sealed =
                    Frame::seal(auth_id::SERVER_AUTH_PROOF, &body, self.session.envelope()?)?;
                self.framed.send(sealed).await?;

                info!(connection = self.id, "Session authenticated");
                self.manager.emit(ManagerEvent::Authenticated(self.id));
                Ok(Flow::Continue)
            }

            other => Err(ProtocolError::UnexpectedPacket(other)),
        }
    }

    /// Frames after authentication: encrypted application traffic routed to
    /// registered handlers.
    fn handle_application(&mut self, frame: Frame) -> Result<Flow> {
        if packet::is_handshake_id(frame.id) {
            return Err(ProtocolError::UnexpectedPacket(frame.id));
        }
        if !frame.encrypted {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_PLAINTEXT_ON_SECURE_SESSION.into(),
            ));
        }

        let plaintext = frame.decrypt(self.session.envelope()?)?;
        self.manager.dispatch_frame(self.id, plaintext)?;
        Ok(Flow::Continue)
    }
}
