//! Connection Manager Implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::session::{ClientSession, SessionOutcome};
use crate::config::Config;
use crate::relay::RelayEngine;
use crate::shutdown::ShutdownCoordinator;
use crate::Result;

/// Accepts client connections and runs one session task per connection
pub struct ConnectionManager {
    listener: Option<TcpListener>,
    config: Arc<Config>,
    relay_engine: RelayEngine,
    active_connections: Arc<AtomicUsize>,
    next_connection_id: Arc<AtomicUsize>,
    shutdown: ShutdownCoordinator,
}

/// Decrements the active connection count when a session task ends, even by panic
struct ActiveConnection(Arc<AtomicUsize>);

impl ActiveConnection {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(config: Arc<Config>) -> Self {
        let relay_engine = RelayEngine::from_config(&config);

        Self {
            listener: None,
            config,
            relay_engine,
            active_connections: Arc::new(AtomicUsize::new(0)),
            next_connection_id: Arc::new(AtomicUsize::new(1)),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Bind the listening socket and return the address actually bound
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let bind_addr = self.config.server.bind_addr;

        info!("Binding TCP listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", bind_addr))?;
        let local_addr = listener.local_addr()?;

        info!("Successfully bound to {}", local_addr);
        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Bind if needed and begin accepting connections
    pub async fn start(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        self.accept_connections().await
    }

    /// Main connection acceptance loop
    async fn accept_connections(&self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Listener not initialized"))?;

        info!("Starting connection acceptance loop");
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if self.shutdown.is_triggered() {
                info!("Shutdown triggered, stopping connection acceptance");
                break;
            }

            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => self.dispatch(stream, addr),
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    break;
                }
            }
        }

        info!("Connection acceptance loop stopped");
        Ok(())
    }

    /// Spawn the session task for an accepted connection
    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        let connection_id = format!(
            "conn_{}",
            self.next_connection_id.fetch_add(1, Ordering::Relaxed)
        );
        debug!("Accepted connection {} from {}", connection_id, addr);

        let engine = self.relay_engine.clone();
        let active = ActiveConnection::enter(&self.active_connections);
        let shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let _active = active;
            let start_time = Instant::now();

            Self::handle_connection_with_shutdown(stream, addr, engine, connection_id.clone(), shutdown_rx).await;

            info!(
                "Connection {} from {} closed after {:?}",
                connection_id,
                addr,
                start_time.elapsed()
            );
        });
    }

    /// Run one session, abandoning it if shutdown is signalled
    #[instrument(skip(stream, engine, shutdown_rx), fields(connection_id = %connection_id, addr = %addr))]
    async fn handle_connection_with_shutdown(
        stream: TcpStream,
        addr: SocketAddr,
        engine: RelayEngine,
        connection_id: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let session = ClientSession::new(connection_id.clone(), addr, engine);

        tokio::select! {
            result = session.run(stream) => match result {
                Ok(SessionOutcome::Relayed(stats)) => {
                    info!(
                        "Connection {} relay completed: {} bytes up, {} bytes down in {:?}",
                        connection_id,
                        stats.bytes_up,
                        stats.bytes_down,
                        Duration::from_millis(stats.duration_ms)
                    );
                }
                Ok(SessionOutcome::Rejected(reply)) => {
                    info!("Connection {} rejected with reply: {}", connection_id, reply);
                }
                Err(e) => {
                    warn!("Connection {} dropped: {:#}", connection_id, e);
                }
            },
            _ = shutdown_rx.recv() => {
                info!("Connection {} received shutdown signal, closing", connection_id);
            }
        }
    }

    /// Get the number of active connections
    pub fn get_active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the bind address if listener is initialized
    pub fn get_bind_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Get connection statistics
    pub fn get_connection_stats(&self) -> ServerStats {
        ServerStats {
            active_connections: self.get_active_connections(),
            total_connections_served: self
                .next_connection_id
                .load(Ordering::Relaxed)
                .saturating_sub(1),
        }
    }

    /// Initiate graceful shutdown
    pub fn initiate_shutdown(&self) {
        info!("Initiating graceful shutdown of connection manager");
        self.shutdown.trigger();
    }

    /// The coordinator whose signal stops this manager, for use from other tasks
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Wait for all connections to close gracefully
    pub async fn wait_for_connections_to_close(&self) -> Result<()> {
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let start_time = Instant::now();

        info!(
            "Waiting for {} active connections to close (timeout: {:?})",
            self.get_active_connections(),
            shutdown_timeout
        );

        while self.get_active_connections() > 0 && start_time.elapsed() < shutdown_timeout {
            debug!("Waiting for {} active connections to close", self.get_active_connections());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.get_active_connections();
        let elapsed = start_time.elapsed();

        if remaining == 0 {
            info!("All connections closed gracefully in {:?}", elapsed);
        } else {
            warn!(
                "Shutdown timeout reached after {:?} with {} connections still active",
                elapsed, remaining
            );
        }

        Ok(())
    }

    /// Gracefully shutdown the connection manager
    pub async fn shutdown(&self) -> Result<()> {
        self.initiate_shutdown();
        self.wait_for_connections_to_close().await
    }
}

/// Connection statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub active_connections: usize,
    pub total_connections_served: usize,
}
