//! Per-connection session state.
//!
//! A session is born `Disconnected`, marked `Connected` once its transport is
//! established, promoted to `Authenticated` when the handshake completes, and
//! discarded on disconnect or auth failure. It is owned exclusively by its
//! connection's processing path and never shared across connections.

use crate::crypto::{EncryptionArgs, Envelope};
use crate::error::{constants, ProtocolError, Result};

/// Handshake lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not yet bound to an established transport.
    Disconnected,
    Connected,
    /// Server side: challenge sent, waiting for the client's proof.
    AwaitingProof,
    /// Client side: initial auth sent, waiting for the server's challenge.
    AwaitingChallenge,
    Authenticated,
    Closed,
}

/// One connection's authentication state and, once authenticated, its cipher.
pub struct Session {
    id: u64,
    state: SessionState,
    encryption: Option<(EncryptionArgs, Box<dyn Envelope>)>,
}

impl Session {
    /// A fresh session in `Disconnected` state. The owner marks it
    /// `Connected` once the transport is established. Client-side sessions
    /// carry no manager-assigned id and pass `0`.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: SessionState::Disconnected,
            encryption: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Promote to `Authenticated`, fixing the cipher args for the session
    /// lifetime. Builds the envelope eagerly so a bad key fails here, not on
    /// the first frame.
    pub fn promote(&mut self, args: EncryptionArgs) -> Result<()> {
        let envelope = args.envelope()?;
        self.encryption = Some((args, envelope));
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// The session cipher, available once authenticated.
    pub fn envelope(&self) -> Result<&dyn Envelope> {
        self.encryption
            .as_ref()
            .map(|(_, envelope)| envelope.as_ref())
            .ok_or_else(|| {
                ProtocolError::HandshakeError(constants::ERR_SESSION_NOT_AUTHENTICATED.into())
            })
    }

    pub fn encryption_args(&self) -> Option<&EncryptionArgs> {
        self.encryption.as_ref().map(|(args, _)| args)
    }

    /// Terminal transition; drops the cipher (its key material is zeroized by
    /// the envelope's own drop).
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.encryption = None;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("encrypted", &self.encryption.is_some())
            .finish()
    }
}
