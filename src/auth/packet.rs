//! Handshake packet ids and payload bodies.
//!
//! Bodies are bincode-serialized serde structs carried as frame payloads. The
//! frame id says which body to expect; there is no type tag inside the body.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::core::frame::Frame;
use crate::error::Result;

/// Handshake packet identifiers.
///
/// `0x01` is skipped: it is the encrypted-frame marker on the wire.
pub mod id {
    pub const CLIENT_SIGNUP: u8 = 0x02;
    pub const CLIENT_INITIAL_AUTH: u8 = 0x03;
    pub const SERVER_INITIAL_AUTH_RESPONSE: u8 = 0x04;
    pub const CLIENT_AUTH_PROOF: u8 = 0x05;
    pub const SERVER_AUTH_PROOF: u8 = 0x06;
}

/// Whether a packet id belongs to the handshake protocol.
///
/// Pre-auth connections may only carry these; the dispatcher refuses to
/// register application handlers on them.
pub fn is_handshake_id(packet_id: u8) -> bool {
    matches!(
        packet_id,
        id::CLIENT_SIGNUP
            | id::CLIENT_INITIAL_AUTH
            | id::SERVER_INITIAL_AUTH_RESPONSE
            | id::CLIENT_AUTH_PROOF
            | id::SERVER_AUTH_PROOF
    )
}

/// One-time account provisioning. The client derives `salt` and `verifier`
/// locally from the password; the password itself never crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSignup {
    pub username: String,
    pub salt: String,
    pub verifier: String,
}

/// First authentication message: username plus the client's public ephemeral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInitialAuth {
    pub username: String,
    pub public_ephemeral: Vec<u8>,
}

/// Server challenge: the stored salt and the server's public ephemeral. The
/// verifier itself stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInitialAuthResponse {
    pub salt: String,
    pub public_ephemeral: Vec<u8>,
}

/// Client's session proof (M1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAuthProof {
    pub proof: Vec<u8>,
}

/// Server's session proof (M2), sent inside an encrypted frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAuthProof {
    pub proof: Vec<u8>,
}

/// Serialize a handshake body into a plaintext frame.
pub fn to_frame<T: Serialize>(packet_id: u8, body: &T) -> Result<Frame> {
    Ok(Frame {
        id: packet_id,
        payload: bincode::serialize(body)?,
        encrypted: false,
    })
}

/// Deserialize a handshake body out of a decoded (and decrypted) frame.
pub fn from_frame<T: DeserializeOwned>(frame: &Frame) -> Result<T> {
    Ok(bincode::deserialize(&frame.payload)?)
}
