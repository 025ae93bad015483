//! Client and server handshake state machines.
//!
//! State is session-scoped and passed through the flow, one struct per side,
//! so concurrent handshakes on different connections can never trample each
//! other. Each step consumes the previous state and returns the next one plus
//! the message to send.
//!
//! Failure anywhere is uniform and terminal: the caller gets
//! [`ProtocolError::AuthenticationFailed`] with no detail about whether the
//! username or the proof was wrong, and closes the connection.

use zeroize::Zeroizing;

use crate::auth::packet::{
    ClientAuthProof, ClientInitialAuth, ClientSignup, ServerAuthProof, ServerInitialAuthResponse,
};
use crate::auth::srp as srp6;
use crate::crypto::{CipherMode, EncryptionArgs};
use crate::error::{ProtocolError, Result};
use crate::store::UserRecord;

use sha1::Sha1;
use ::srp::client::SrpClientVerifier;
use tracing::debug;

/// Client state between `client_begin` and `client_prove`.
pub struct ClientAuthState {
    username: String,
    private_ephemeral: Zeroizing<[u8; srp6::EPHEMERAL_LEN]>,
}

/// Client state between `client_prove` and `client_finish`.
pub struct ClientProofState {
    salt: String,
    verifier: SrpClientVerifier<Sha1>,
}

impl ClientProofState {
    /// Cipher args derived from the shared session key. The caller needs
    /// these one step early: the server's proof arrives inside an encrypted
    /// frame, so decryption precedes [`client_finish`]'s verification.
    pub fn encryption_args(&self) -> EncryptionArgs {
        EncryptionArgs::new(
            CipherMode::Aes,
            hex::encode(self.verifier.key()),
            self.salt.clone(),
        )
    }
}

/// Server state retained between `server_respond` and `server_verify`:
/// the private ephemeral, the stored credentials, and the client's public.
pub struct ServerAuthState {
    username: String,
    salt: String,
    verifier: Zeroizing<Vec<u8>>,
    private_ephemeral: Zeroizing<[u8; srp6::EPHEMERAL_LEN]>,
    client_public: Vec<u8>,
}

impl ServerAuthState {
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Build the signup body for a new account. Salt and verifier are derived
/// locally; the password never leaves this function.
pub fn signup(username: &str, password: &str) -> ClientSignup {
    let salt = srp6::generate_salt();
    let verifier = srp6::compute_verifier(username, password, &salt);
    ClientSignup {
        username: username.to_string(),
        salt: hex::encode(salt),
        verifier: hex::encode(verifier),
    }
}

/// Step 1 (client): generate an ephemeral and announce the username.
pub fn client_begin(username: &str) -> (ClientAuthState, ClientInitialAuth) {
    let private_ephemeral = Zeroizing::new(srp6::generate_private_ephemeral());
    let public_ephemeral = srp6::client().compute_public_ephemeral(private_ephemeral.as_ref());

    debug!(username, "Client initiating authentication");

    (
        ClientAuthState {
            username: username.to_string(),
            private_ephemeral,
        },
        ClientInitialAuth {
            username: username.to_string(),
            public_ephemeral,
        },
    )
}

/// Step 2 (server): look up happened at the call site; generate our ephemeral
/// and challenge the client with the stored salt.
pub fn server_respond(
    user: &UserRecord,
    msg: &ClientInitialAuth,
) -> Result<(ServerAuthState, ServerInitialAuthResponse)> {
    let verifier = Zeroizing::new(
        hex::decode(&user.verifier).map_err(|_| ProtocolError::AuthenticationFailed)?,
    );

    let private_ephemeral = Zeroizing::new(srp6::generate_private_ephemeral());
    let public_ephemeral =
        srp6::server().compute_public_ephemeral(private_ephemeral.as_ref(), &verifier);

    debug!(username = %user.username, "Server issuing SRP challenge");

    Ok((
        ServerAuthState {
            username: user.username.clone(),
            salt: user.salt.clone(),
            verifier,
            private_ephemeral,
            client_public: msg.public_ephemeral.clone(),
        },
        ServerInitialAuthResponse {
            salt: user.salt.clone(),
            public_ephemeral,
        },
    ))
}

/// Step 3 (client): derive the private key from `(salt, username, password)`,
/// compute the shared session key, and produce the proof M1.
pub fn client_prove(
    state: ClientAuthState,
    password: &str,
    msg: &ServerInitialAuthResponse,
) -> Result<(ClientProofState, ClientAuthProof)> {
    let salt_bytes = hex::decode(&msg.salt).map_err(|_| ProtocolError::AuthenticationFailed)?;

    let verifier = srp6::client()
        .process_reply(
            state.private_ephemeral.as_ref(),
            state.username.as_bytes(),
            password.as_bytes(),
            &salt_bytes,
            &msg.public_ephemeral,
        )
        .map_err(|_| ProtocolError::AuthenticationFailed)?;

    let proof = verifier.proof().to_vec();
    debug!(username = %state.username, "Client derived session key, sending proof");

    Ok((
        ClientProofState {
            salt: msg.salt.clone(),
            verifier,
        },
        ClientAuthProof { proof },
    ))
}

/// Step 4 (server): derive our own session key from the retained secret, the
/// client's public ephemeral and the stored verifier; check the client's
/// proof; on success return the session cipher args and our proof M2.
///
/// The caller sends the returned [`ServerAuthProof`] inside an *encrypted*
/// frame built from the returned args: decrypting it is the client's liveness
/// proof that both sides share a working cipher.
pub fn server_verify(
    state: ServerAuthState,
    msg: &ClientAuthProof,
) -> Result<(EncryptionArgs, ServerAuthProof)> {
    let verifier = srp6::server()
        .process_reply(
            state.private_ephemeral.as_ref(),
            &state.verifier,
            &state.client_public,
        )
        .map_err(|_| ProtocolError::AuthenticationFailed)?;

    verifier
        .verify_client(&msg.proof)
        .map_err(|_| ProtocolError::AuthenticationFailed)?;

    let args = EncryptionArgs::new(CipherMode::Aes, hex::encode(verifier.key()), state.salt);
    let reply = ServerAuthProof {
        proof: verifier.proof().to_vec(),
    };

    debug!(username = %state.username, "Client proof verified, session authenticated");
    Ok((args, reply))
}

/// Step 5 (client): verify the server's proof; on success the session is
/// authenticated and all further frames go through the envelope.
pub fn client_finish(state: ClientProofState, msg: &ServerAuthProof) -> Result<EncryptionArgs> {
    state
        .verifier
        .verify_server(&msg.proof)
        .map_err(|_| ProtocolError::AuthenticationFailed)?;

    debug!("Server proof verified, session authenticated");
    Ok(EncryptionArgs::new(
        CipherMode::Aes,
        hex::encode(state.verifier.key()),
        state.salt,
    ))
}
