//! Mock transport for testing without real network.
//!
//! Streams are pairs of in-memory tokio pipes, so anything that reads and
//! writes through `AsyncRead`/`AsyncWrite` behaves as it would over QUIC.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::io::{duplex, DuplexStream};
use tokio::sync::{mpsc, Mutex};

use qfetch_core::error::{Error, Result};
use qfetch_core::transport::Connection;

/// Per-direction pipe capacity.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Server half of one mock stream: `(send, recv)`.
type ServerHalf = (DuplexStream, DuplexStream);

/// Server side of a mock connection.
#[derive(Debug)]
pub struct MockConnection {
    remote_addr: SocketAddr,
    incoming: Mutex<mpsc::Receiver<ServerHalf>>,
}

impl Connection for MockConnection {
    type SendStream = DuplexStream;
    type RecvStream = DuplexStream;

    async fn accept_stream(&self) -> Result<(DuplexStream, DuplexStream)> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::ConnectionClosed)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// Client side of a mock connection.
///
/// Dropping it closes the connection: a pending `accept_stream` on the
/// server side returns [`Error::ConnectionClosed`].
#[derive(Debug)]
pub struct MockClient {
    local_addr: SocketAddr,
    streams: mpsc::Sender<ServerHalf>,
}

impl MockClient {
    /// Open a bidirectional stream. Returns the client's `(send, recv)`.
    pub async fn open_stream(&self) -> Result<(DuplexStream, DuplexStream)> {
        let (client_send, server_recv) = duplex(PIPE_CAPACITY);
        let (server_send, client_recv) = duplex(PIPE_CAPACITY);

        self.streams
            .send((server_send, server_recv))
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        Ok((client_send, client_recv))
    }

    /// Address the server sees for this client.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Create a connected client/server pair.
pub fn mock_connection_pair() -> (MockClient, MockConnection) {
    let client_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000);
    let (tx, rx) = mpsc::channel(4);

    let client = MockClient {
        local_addr: client_addr,
        streams: tx,
    };
    let server = MockConnection {
        remote_addr: client_addr,
        incoming: Mutex::new(rx),
    };

    (client, server)
}
