//! Async timeout wrappers and protocol timing defaults.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default timeout for connection establishment and blocking operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period a server announces in its goodbye frame.
pub const SERVER_GOODBYE_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period a client announces in its goodbye frame.
pub const CLIENT_GOODBYE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for graceful server shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a future with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
