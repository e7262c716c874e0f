//! QUIC connection acceptor.
//!
//! [`FileListener`] binds the endpoint with the provisioned identity and runs
//! the accept loop. Each incoming connection gets its own task which completes
//! the handshake, serves one request, then holds the connection until the
//! peer closes it or it idles out. The loop itself never waits on a task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::Endpoint;
use tracing::{debug, info, warn};

use qfetch_core::constants::IDLE_TIMEOUT;
use qfetch_core::error::Result;
use qfetch_core::transport::{server_endpoint, QuicConnection};
use qfetch_core::TlsIdentity;

use crate::dispatch::Dispatcher;
use crate::handler::handle_connection;
use crate::sandbox::BaseDir;

// =============================================================================
// Server Configuration
// =============================================================================

/// Immutable server configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root of everything the server exposes.
    pub base_dir: BaseDir,
    /// Bind address for the server.
    pub listen_addr: SocketAddr,
    /// TLS identity presented to clients.
    pub identity: TlsIdentity,
    /// QUIC idle timeout.
    pub idle_timeout: Duration,
}

impl ServerConfig {
    /// Configuration with the default idle timeout.
    pub fn new(base_dir: BaseDir, listen_addr: SocketAddr, identity: TlsIdentity) -> Self {
        Self {
            base_dir,
            listen_addr,
            identity,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

// =============================================================================
// FileListener
// =============================================================================

/// Handle that stops a running listener.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    endpoint: Endpoint,
}

impl ShutdownHandle {
    /// Close the endpoint. In-flight connections are dropped, not drained.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"server shutdown");
    }
}

/// Bound QUIC listener.
pub struct FileListener {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    dispatcher: Arc<Dispatcher>,
}

impl FileListener {
    /// Bind the listen address. Failure is fatal to startup.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let endpoint = server_endpoint(&config.identity, config.listen_addr, config.idle_timeout)?;
        let local_addr = endpoint.local_addr()?;
        let dispatcher = Arc::new(Dispatcher::new(config.base_dir.clone()));

        Ok(Self {
            endpoint,
            local_addr,
            config: Arc::new(config),
            dispatcher,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the configuration this listener was bound with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle for closing the endpoint from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            endpoint: self.endpoint.clone(),
        }
    }

    /// Run the accept loop until the endpoint is closed.
    pub async fn run(self) -> Result<()> {
        info!(
            addr = %self.local_addr,
            base_dir = %self.dispatcher.base_dir().path().display(),
            fingerprint = %self.config.identity.fingerprint(),
            idle_timeout_ms = self.config.idle_timeout.as_millis() as u64,
            "Server listening"
        );

        while let Some(incoming) = self.endpoint.accept().await {
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                let peer = incoming.remote_address();
                let conn = match incoming.await {
                    Ok(conn) => QuicConnection::new(conn),
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "Connection handshake failed");
                        return;
                    }
                };
                debug!(peer = %peer, "Connection accepted");

                handle_connection(&conn, &dispatcher).await;
                conn.closed().await;
            });
        }

        info!("Endpoint closed, accept loop finished");
        Ok(())
    }
}

/// Bind and serve until the endpoint is closed.
pub async fn serve(config: ServerConfig) -> Result<()> {
    FileListener::bind(config).await?.run().await
}
