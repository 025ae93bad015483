//! # SRP6 Authentication
//!
//! The challenge-response handshake that authenticates a user and derives the
//! shared session key gating the switch from plaintext to encrypted traffic.
//!
//! ## Flow
//! ```text
//! client                                server
//!   | ClientInitialAuth {user, A}         |
//!   |------------------------------------>| lookup {salt, verifier}
//!   | ServerInitialAuthResponse {salt, B} |
//!   |<------------------------------------| state: AwaitingProof
//!   | ClientAuthProof {M1}                |
//!   |------------------------------------>| verify M1, derive key
//!   | ServerAuthProof {M2}  (encrypted)   |
//!   |<------------------------------------| state: Authenticated
//!   | verify M2 -> Authenticated          |
//! ```
//!
//! The server's proof reply travels inside an encrypted frame: receiving and
//! decrypting it doubles as a liveness proof that both sides hold a working
//! cipher. Any failure at any step is fatal for the connection; retrying
//! means a fresh connection.
//!
//! Unknown user and wrong password take the same failure path
//! ([`crate::error::ProtocolError::AuthenticationFailed`], silent close) so an
//! attacker cannot tell them apart from the reply.

pub mod handshake;
pub mod packet;
pub mod srp;

#[cfg(test)]
mod tests;
