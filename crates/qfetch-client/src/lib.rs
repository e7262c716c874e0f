//! qfetch-client: QUIC client for the qfetch file server.
//!
//! The server answers exactly one command per connection, so [`FetchClient`]
//! dials a fresh connection for every request after the first. The
//! certificate seen on the first handshake is remembered and every later
//! handshake must present the same one.

pub mod cli;

use std::net::SocketAddr;
use std::time::Duration;

use quinn::Endpoint;
use tokio::sync::Mutex;
use tracing::{debug, info};

use qfetch_core::constants::{CONNECT_TIMEOUT, SERVER_NAME};
use qfetch_core::error::{Error, Result};
use qfetch_core::protocol::parse_error_line;
use qfetch_core::transport::{client_endpoint, QuicConnection};
use qfetch_core::Command;

pub use cli::{Cli, ClientCommand};

/// Client connection options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Expected SHA-256 of the server certificate. `None` trusts on first use.
    pub cert_hash: Option<Vec<u8>>,
    /// Handshake timeout per connection.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cert_hash: None,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Client for one qfetch server.
pub struct FetchClient {
    endpoint: Endpoint,
    server_addr: SocketAddr,
    options: ClientOptions,
    fingerprint: String,
    /// Connection from the initial handshake, not yet used for a request.
    pending: Mutex<Option<QuicConnection>>,
}

impl FetchClient {
    /// Connect to a server, verifying the handshake completes.
    pub async fn connect(server_addr: SocketAddr, options: ClientOptions) -> Result<Self> {
        info!(addr = %server_addr, pinned = options.cert_hash.is_some(), "Connecting to server");

        let endpoint = client_endpoint(server_addr, options.cert_hash.as_deref())?;
        let conn = dial(&endpoint, server_addr, options.connect_timeout).await?;
        let fingerprint = conn.peer_fingerprint().ok_or_else(|| Error::Certificate {
            message: "server presented no certificate".to_string(),
        })?;

        info!(fingerprint = %fingerprint, "QUIC connection established");

        Ok(Self {
            endpoint,
            server_addr,
            options,
            fingerprint,
            pending: Mutex::new(Some(conn)),
        })
    }

    /// SHA-256 fingerprint of the server certificate, lowercase hex.
    pub fn server_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Server address this client talks to.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// List the regular entries of the server's base directory.
    ///
    /// A listing that is exactly one `ERR:` line is reported as
    /// [`Error::Remote`], so a directory whose only entry is named like
    /// `ERR: x` is indistinguishable from an error.
    pub async fn list(&self) -> Result<Vec<String>> {
        let reply = self.request(&Command::List.to_line()).await?;
        if let Some(message) = parse_error_line(&reply) {
            return Err(Error::Remote { message });
        }

        Ok(String::from_utf8_lossy(&reply)
            .lines()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Fetch the contents of one file.
    ///
    /// A reply that is exactly one `ERR:` line is reported as
    /// [`Error::Remote`]. A file whose entire content has that shape is
    /// indistinguishable from an error.
    pub async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let reply = self
            .request(&Command::Get(name.to_string()).to_line())
            .await?;
        match parse_error_line(&reply) {
            Some(message) => Err(Error::Remote { message }),
            None => Ok(reply),
        }
    }

    /// Send a raw request line and return the raw reply.
    ///
    /// `line` is written as given; append `\n` to terminate it.
    pub async fn request(&self, line: &str) -> Result<Vec<u8>> {
        let conn = self.take_connection().await?;
        let result = exchange(&conn, line.as_bytes()).await;
        conn.close("done");
        result
    }

    /// Close the client, dropping any unused connection.
    pub async fn close(self) {
        if let Some(conn) = self.pending.lock().await.take() {
            conn.close("client closed");
        }
        self.endpoint.close(0u32.into(), b"client closed");
        self.endpoint.wait_idle().await;
    }

    async fn take_connection(&self) -> Result<QuicConnection> {
        let pending = self.pending.lock().await.take();
        if let Some(conn) = pending {
            match conn.inner().close_reason() {
                None => return Ok(conn),
                Some(reason) => debug!(reason = %reason, "Initial connection gone, redialing"),
            }
        }

        let conn = dial(&self.endpoint, self.server_addr, self.options.connect_timeout).await?;
        match conn.peer_fingerprint() {
            Some(seen) if seen == self.fingerprint => Ok(conn),
            seen => {
                conn.close("certificate changed");
                Err(Error::Certificate {
                    message: format!(
                        "server certificate changed: expected {}, got {}",
                        self.fingerprint,
                        seen.as_deref().unwrap_or("none")
                    ),
                })
            }
        }
    }
}

async fn dial(endpoint: &Endpoint, addr: SocketAddr, timeout: Duration) -> Result<QuicConnection> {
    let connecting = endpoint
        .connect(addr, SERVER_NAME)
        .map_err(|e| Error::Transport {
            message: format!("failed to initiate connection: {}", e),
        })?;

    let conn = tokio::time::timeout(timeout, connecting)
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| Error::Transport {
            message: format!("connection failed: {}", e),
        })?;

    debug!(addr = %addr, "Handshake complete");
    Ok(QuicConnection::new(conn))
}

async fn exchange(conn: &QuicConnection, request: &[u8]) -> Result<Vec<u8>> {
    let (mut send, mut recv) = conn.open_stream().await?;

    send.write_all(request).await.map_err(|e| Error::Transport {
        message: format!("failed to send request: {}", e),
    })?;
    send.finish().map_err(|e| Error::Transport {
        message: format!("failed to finish stream: {}", e),
    })?;

    let reply = recv.read_to_end(usize::MAX).await.map_err(|e| Error::Transport {
        message: format!("failed to read reply: {}", e),
    })?;
    debug!(bytes = reply.len(), "Reply received");
    Ok(reply)
}
