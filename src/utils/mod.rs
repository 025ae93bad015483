//! # Utility Modules
//!
//! Supporting utilities shared across the protocol implementation.
//!
//! ## Components
//! - **Logging**: Structured logging configuration via `tracing`
//! - **Timeout**: Async timeout wrappers and protocol timing defaults

pub mod logging;
pub mod timeout;
