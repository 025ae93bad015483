//! TCP server accept loop and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::config::{NetworkConfig, ServerConfig};
use crate::error::Result;
use crate::store::CredentialCache;
use crate::transport::connection;
use crate::transport::manager::{ConnectionManager, ManagerEvent};

/// A bound protocol server.
///
/// Construction binds the listener; [`Server::run`] (or
/// [`Server::run_with_shutdown`]) drives the accept loop. Application
/// handlers are registered through [`Server::manager`] before running.
pub struct Server {
    listener: TcpListener,
    manager: Arc<ConnectionManager>,
    cache: Arc<CredentialCache>,
    config: ServerConfig,
}

impl Server {
    /// Bind to the configured address and return the server plus the receiving
    /// end of its event channel.
    #[instrument(skip(config, cache), fields(address = %config.server.address))]
    pub async fn bind(
        config: &NetworkConfig,
        cache: Arc<CredentialCache>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ManagerEvent>)> {
        config.validate_strict()?;

        let listener = TcpListener::bind(&config.server.address).await?;
        info!(address = %config.server.address, "Listening");

        let (manager, events_rx) = ConnectionManager::new();
        Ok((
            Self {
                listener,
                manager,
                cache,
                config: config.server.clone(),
            },
            events_rx,
        ))
    }

    /// The actual bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the connection manager, for handler registration and
    /// server-initiated sends.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Run until CTRL+C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Run the accept loop until the shutdown channel fires, then wait for
    /// live connections to drain within the configured shutdown timeout.
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    self.drain().await;
                    return Ok(());
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            if self.manager.connection_count().await >= self.config.max_connections {
                                warn!(%peer, "Connection limit reached, refusing");
                                drop(stream);
                                continue;
                            }

                            let manager = Arc::clone(&self.manager);
                            let cache = Arc::clone(&self.cache);
                            let goodbye_timeout = self.config.goodbye_timeout;
                            tokio::spawn(async move {
                                connection::serve(stream, manager, cache, goodbye_timeout).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }

    async fn drain(&self) {
        let timeout = tokio::time::sleep(self.config.shutdown_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                _ = &mut timeout => {
                    warn!("Shutdown timeout reached, forcing exit");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(500)) => {
                    let connections = self.manager.connection_count().await;
                    info!(connections, "Waiting for connections to close");
                    if connections == 0 {
                        info!("All connections closed, shutting down");
                        return;
                    }
                }
            }
        }
    }
}
