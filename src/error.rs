//! # Error Types
//!
//! Error handling for the realm protocol core.
//!
//! This module defines every error variant the protocol can surface, from
//! low-level framing faults to handshake failures and store I/O.
//!
//! ## Error Categories
//! - **Framing**: malformed headers, truncated payloads, oversized frames
//! - **Cryptographic**: encryption/decryption (padding) failures
//! - **Authentication**: SRP proof mismatch or unknown user (uniform failure)
//! - **Dispatch**: duplicate or reserved packet-id registration
//! - **Transport**: connection resets, timeouts, I/O faults
//!
//! Framing, decryption and authentication errors are fatal for the affected
//! connection only; they are reported through the manager's event channel and
//! never cross task boundaries as panics. Registration errors are setup-time
//! programming errors and should halt startup.

use std::io;
use thiserror::Error;

/// Error message constants shared by error construction sites.
pub mod constants {
    pub const ERR_SESSION_NOT_AUTHENTICATED: &str = "Session is not authenticated";
    pub const ERR_PLAINTEXT_ON_SECURE_SESSION: &str =
        "Plaintext frame on an encrypted session";
}

/// ProtocolError is the primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Truncated frame: declared {declared} bytes, {available} available")]
    TruncatedFrame { declared: usize, available: usize },

    #[error("Oversized frame: {0} bytes")]
    OversizedFrame(usize),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Handshake error: {0}")]
    HandshakeError(String),

    #[error("Duplicate handler for packet id {0:#04x}")]
    DuplicateHandler(u8),

    #[error("Packet id {0:#04x} is reserved")]
    ReservedPacketId(u8),

    #[error("Unexpected packet id {0:#04x} for current session state")]
    UnexpectedPacket(u8),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Operation timed out")]
    Timeout,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error should terminate the connection it occurred on.
    ///
    /// Setup-time errors (registration, configuration) are excluded: they are
    /// raised before any connection exists.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::DuplicateHandler(_)
                | ProtocolError::ReservedPacketId(_)
                | ProtocolError::ConfigError(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
