//! # Service Layer
//!
//! High-level server and client entry points that tie the transport, the
//! handshake, and the credential store together.
//!
//! ## Components
//! - **Server**: TCP accept loop with graceful shutdown, one task per
//!   connection
//! - **Client**: connects, authenticates, and exposes a [`SecureChannel`]
//!   carrying only encrypted frames

pub mod client;
pub mod server;

pub use client::{Client, SecureChannel};
pub use server::Server;
