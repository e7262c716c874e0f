//! Transport abstractions for qfetch.
//!
//! The server only needs two things from a connection: accept the next
//! bidirectional stream, and say who is on the other end. The trait keeps the
//! stream handler independent of QUIC so it can be driven by in-memory mocks.

mod quic;

pub use quic::{
    client_crypto_config, client_endpoint, server_crypto_config, server_endpoint, QuicConnection,
};

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// A multiplexed, encrypted connection from the server's point of view.
pub trait Connection: Send + Sync {
    /// Write half of an accepted stream.
    type SendStream: AsyncWrite + Unpin + Send;

    /// Read half of an accepted stream.
    type RecvStream: AsyncRead + Unpin + Send;

    /// Wait for the peer to open a bidirectional stream.
    fn accept_stream(
        &self,
    ) -> impl Future<Output = Result<(Self::SendStream, Self::RecvStream)>> + Send;

    /// Get the remote peer's address.
    fn remote_addr(&self) -> SocketAddr;
}
