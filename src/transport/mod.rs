//! # Connection Transport
//!
//! Live-connection ownership and frame routing.
//!
//! ## Components
//! - **Dispatcher**: packet-id to handler registry; duplicate registration is
//!   a setup-time error, dispatch is one spawned task per frame
//! - **ConnectionManager**: concurrent map of live connections, per-manager
//!   event channel, graceful teardown
//! - **connection**: the per-connection read loop driving handshake then
//!   application dispatch, plus the goodbye protocol
//!
//! Frames within one connection are processed in arrival order; no ordering
//! holds across connections. Failures are fatal only for their own connection
//! and surface as [`manager::ManagerEvent`]s, never as panics in sibling
//! tasks.

pub mod connection;
pub mod dispatcher;
pub mod manager;

pub use dispatcher::Dispatcher;
pub use manager::{ConnectionId, ConnectionManager, ManagerEvent};
