//! # Realm Protocol
//!
//! Secure client-server transport with packet framing, SRP6 mutual
//! authentication, and an encrypted session channel.
//!
//! ## Architecture
//! - **core**: wire framing, stream reassembly, and the tokio codec
//! - **crypto**: AES-128-CBC and Blowfish-CBC session envelopes behind one
//!   strategy trait
//! - **auth**: the SRP6 handshake packets and state machines
//! - **session**: per-connection authentication state and cipher
//! - **transport**: connection manager, packet dispatcher, per-connection loop
//! - **store**: credential persistence and the TTL credential cache
//! - **service**: high-level [`Server`](service::Server) and
//!   [`Client`](service::Client) entry points
//!
//! ## Wire Format
//! ```text
//! plaintext:  [Id(1)] [Length(2, LE)] [Payload(N)]
//! encrypted:  [0x01] [Id(1)] [Length(2, LE)] [Ciphertext(N)]
//! ```
//!
//! Packet id `0x01` is reserved as the encrypted marker; `0xFE`/`0xFF` carry
//! the goodbye exchange.
//!
//! ## Security
//! - Passwords never cross the wire: signup transmits an SRP salt and
//!   verifier, authentication exchanges ephemeral proofs
//! - Authentication failure is uniform and silent; peers learn nothing about
//!   whether the account or the proof was wrong
//! - Session keys and stored verifiers are zeroized on drop
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use realm_protocol::config::NetworkConfig;
//! use realm_protocol::service::{Client, Server};
//! use realm_protocol::store::{CredentialCache, FileUserStore};
//!
//! # async fn run() -> realm_protocol::error::Result<()> {
//! let config = NetworkConfig::default();
//!
//! let store = FileUserStore::open("users.db").await?;
//! let cache = Arc::new(CredentialCache::from_config(Box::new(store), &config.cache).await?);
//! let (server, _events) = Server::bind(&config, cache).await?;
//! tokio::spawn(server.run());
//!
//! let mut channel = Client::signup_and_connect(&config.client, "mats", "secret").await?;
//! channel.send(0x20, b"hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;
pub mod utils;

pub use config::NetworkConfig;
pub use crate::core::frame::{Frame, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};
pub use crate::core::reassembler::StreamReassembler;
pub use crypto::{CipherMode, EncryptionArgs, Envelope};
pub use error::{ProtocolError, Result};
pub use service::{Client, SecureChannel, Server};
pub use session::{Session, SessionState};
pub use store::{CredentialCache, FileUserStore, UserRecord, UserStore};
pub use transport::{ConnectionId, ConnectionManager, ManagerEvent};
