//! Client connector and the authenticated secure channel.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument};

use crate::auth::handshake;
use crate::auth::packet::{self, id as auth_id};
use crate::config::ClientConfig;
use crate::core::codec::FrameCodec;
use crate::core::frame::{Frame, ID_CLIENT_GOODBYE, ID_SERVER_GOODBYE};
use crate::crypto::EncryptionArgs;
use crate::error::{constants, ProtocolError, Result};
use crate::session::{Session, SessionState};
use crate::utils::timeout::with_timeout;

/// Client-side entry points.
pub struct Client;

impl Client {
    /// Connect and authenticate an existing account.
    #[instrument(skip(config, password), fields(address = %config.address, %username))]
    pub async fn connect(
        config: &ClientConfig,
        username: &str,
        password: &str,
    ) -> Result<SecureChannel> {
        let raw = RawChannel::connect(config).await?;
        raw.authenticate(username, password).await
    }

    /// Register a new account, then authenticate it, all on one connection.
    ///
    /// Registration sends the SRP salt and verifier; the password itself
    /// never crosses the wire.
    #[instrument(skip(config, password), fields(address = %config.address, %username))]
    pub async fn signup_and_connect(
        config: &ClientConfig,
        username: &str,
        password: &str,
    ) -> Result<SecureChannel> {
        let mut raw = RawChannel::connect(config).await?;

        let signup = handshake::signup(username, password);
        raw.send_plain(packet::to_frame(auth_id::CLIENT_SIGNUP, &signup)?)
            .await?;
        debug!(%username, "Signup sent");

        raw.authenticate(username, password).await
    }
}

/// Pre-authentication connection state.
struct RawChannel {
    framed: Framed<TcpStream, FrameCodec>,
    session: Session,
    response_timeout: Duration,
    goodbye_timeout: Duration,
}

impl RawChannel {
    async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = with_timeout(config.connection_timeout, async {
            Ok(TcpStream::connect(&config.address).await?)
        })
        .await?;

        let mut session = Session::new(0);
        session.set_state(SessionState::Connected);

        Ok(Self {
            framed: Framed::new(stream, FrameCodec),
            session,
            response_timeout: config.response_timeout,
            goodbye_timeout: config.goodbye_timeout,
        })
    }

    async fn send_plain(&mut self, frame: Frame) -> Result<()> {
        self.framed.send(frame).await
    }

    async fn recv(&mut self) -> Result<Frame> {
        let deadline = self.response_timeout;
        let framed = &mut self.framed;
        with_timeout(deadline, async {
            match framed.next().await {
                Some(result) => result,
                None => Err(ProtocolError::ConnectionClosed),
            }
        })
        .await
    }

    /// Drive the four-message handshake to completion.
    ///
    /// A server that closes the connection instead of answering is reported
    /// as [`ProtocolError::AuthenticationFailed`]: a silent close is the only
    /// rejection signal the protocol permits.
    async fn authenticate(mut self, username: &str, password: &str) -> Result<SecureChannel> {
        let (state, initial) = handshake::client_begin(username);
        self.send_plain(packet::to_frame(auth_id::CLIENT_INITIAL_AUTH, &initial)?)
            .await?;
        self.session.set_state(SessionState::AwaitingChallenge);

        let challenge_frame = self.recv().await.map_err(auth_rejection)?;
        if challenge_frame.id != auth_id::SERVER_INITIAL_AUTH_RESPONSE {
            return Err(ProtocolError::UnexpectedPacket(challenge_frame.id));
        }
        let challenge: packet::ServerInitialAuthResponse = packet::from_frame(&challenge_frame)?;

        let (proof_state, proof) = handshake::client_prove(state, password, &challenge)?;
        self.send_plain(packet::to_frame(auth_id::CLIENT_AUTH_PROOF, &proof)?)
            .await?;

        // The server's proof arrives inside an encrypted frame built from the
        // session key both sides just derived. Decrypting it with our own
        // derivation is the liveness check that the ciphers agree.
        let proof_frame = self.recv().await.map_err(auth_rejection)?;
        if proof_frame.id != auth_id::SERVER_AUTH_PROOF || !proof_frame.encrypted {
            return Err(ProtocolError::AuthenticationFailed);
        }

        let args = proof_state.encryption_args();
        let envelope = args.envelope()?;
        let body = envelope
            .decrypt(&proof_frame.payload)
            .map_err(|_| ProtocolError::AuthenticationFailed)?;
        let server_proof: packet::ServerAuthProof = bincode::deserialize(&body)?;

        let confirmed = handshake::client_finish(proof_state, &server_proof)?;
        let mut session = self.session;
        session.promote(confirmed.clone())?;
        info!(%username, "Authenticated");

        Ok(SecureChannel {
            framed: self.framed,
            args: confirmed,
            session,
            response_timeout: self.response_timeout,
            goodbye_timeout: self.goodbye_timeout,
            last_activity: Instant::now(),
        })
    }
}

fn auth_rejection(error: ProtocolError) -> ProtocolError {
    match error {
        ProtocolError::ConnectionClosed => ProtocolError::AuthenticationFailed,
        other => other,
    }
}

/// An authenticated connection. Every application frame that passes through
/// here is encrypted with the session cipher.
pub struct SecureChannel {
    framed: Framed<TcpStream, FrameCodec>,
    args: EncryptionArgs,
    session: Session,
    response_timeout: Duration,
    goodbye_timeout: Duration,
    last_activity: Instant,
}

impl SecureChannel {
    /// Encrypt and send one application frame.
    pub async fn send(&mut self, id: u8, payload: &[u8]) -> Result<()> {
        let sealed = Frame::seal(id, payload, self.session.envelope()?)?;
        self.framed.send(sealed).await?;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Time since the last frame was sent or received on this channel.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Receive and decrypt one application frame.
    ///
    /// A server goodbye is acknowledged and surfaced as
    /// [`ProtocolError::ConnectionClosed`]. Any other plaintext frame on the
    /// authenticated channel is a protocol violation and rejected.
    pub async fn recv(&mut self) -> Result<Frame> {
        let frame = {
            let deadline = self.response_timeout;
            let framed = &mut self.framed;
            with_timeout(deadline, async {
                match framed.next().await {
                    Some(result) => result,
                    None => Err(ProtocolError::ConnectionClosed),
                }
            })
            .await?
        };

        if frame.id == ID_SERVER_GOODBYE {
            debug!("Server goodbye received, acknowledging");
            let ack = goodbye_frame(ID_CLIENT_GOODBYE, self.goodbye_timeout);
            self.framed.send(ack).await?;
            self.session.close();
            return Err(ProtocolError::ConnectionClosed);
        }

        // Mirrors the server: once the handshake is done, unencrypted
        // non-goodbye traffic never reaches application code.
        if !frame.encrypted {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_PLAINTEXT_ON_SECURE_SESSION.into(),
            ));
        }

        self.last_activity = Instant::now();
        frame.decrypt(self.session.envelope()?)
    }

    /// The cipher parameters the handshake settled on.
    pub fn encryption_args(&self) -> &EncryptionArgs {
        &self.args
    }

    /// Announce disconnect, wait for the server's acknowledgement, and close.
    pub async fn goodbye(mut self) -> Result<()> {
        self.framed
            .send(goodbye_frame(ID_CLIENT_GOODBYE, self.goodbye_timeout))
            .await?;

        // Tolerate a server that closes without acking.
        let deadline = self.goodbye_timeout;
        let framed = &mut self.framed;
        let _ = with_timeout(deadline, async {
            match framed.next().await {
                Some(result) => result,
                None => Err(ProtocolError::ConnectionClosed),
            }
        })
        .await;

        self.session.close();
        debug!("Channel closed");
        Ok(())
    }
}

fn goodbye_frame(id: u8, timeout: Duration) -> Frame {
    Frame {
        id,
        payload: (timeout.as_secs() as u32).to_le_bytes().to_vec(),
        encrypted: false,
    }
}
