//! Per-connection stream command handling.
//!
//! A connection is served by accepting its first bidirectional stream,
//! reading one command line, dispatching it, and finishing the stream. Later
//! streams on the same connection are never accepted.
//!
//! ```text
//! Idle -> Reading -> { Listing | Fetching | Unrecognized } -> Closed
//! ```

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use qfetch_core::error::{Error, Result};
use qfetch_core::protocol::{error_line, read_command_line};
use qfetch_core::transport::Connection;
use qfetch_core::Command;

use crate::dispatch::{Dispatcher, Outcome};

/// Lifecycle of one request stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepted, nothing read yet.
    Idle,
    /// Reading the command line.
    Reading,
    /// Writing a directory listing.
    Listing,
    /// Writing file bytes or a fetch error.
    Fetching,
    /// Answering a command that was not understood.
    Unrecognized,
    /// Send side finished. Terminal.
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Reading => "reading",
            StreamState::Listing => "listing",
            StreamState::Fetching => "fetching",
            StreamState::Unrecognized => "unrecognized",
            StreamState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One accepted request stream.
///
/// [`CommandStream::run`] consumes the stream and finishes its send side on
/// every path, so it is answered at most once.
pub struct CommandStream<S, R> {
    send: S,
    recv: R,
    state: StreamState,
    peer: SocketAddr,
}

impl<S, R> CommandStream<S, R>
where
    S: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    /// Wrap an accepted stream.
    pub fn new(send: S, recv: R, peer: SocketAddr) -> Self {
        Self {
            send,
            recv,
            state: StreamState::Idle,
            peer,
        }
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Read one command, answer it, and close the stream.
    pub async fn run(mut self, dispatcher: &Dispatcher) -> Result<Outcome> {
        let result = self.serve(dispatcher).await;
        self.close().await;
        result
    }

    async fn serve(&mut self, dispatcher: &Dispatcher) -> Result<Outcome> {
        self.transition(StreamState::Reading);

        let line = match read_command_line(&mut self.recv).await {
            Ok(line) => line,
            Err(Error::Protocol { message }) => {
                warn!(peer = %self.peer, reason = %message, "Bad command line");
                self.transition(StreamState::Unrecognized);
                self.send.write_all(error_line(&message).as_bytes()).await?;
                return Ok(Outcome::Rejected { reason: message });
            }
            Err(e) => return Err(e),
        };

        let command = Command::parse(&line);
        self.transition(match &command {
            Some(Command::List) => StreamState::Listing,
            Some(Command::Get(_)) => StreamState::Fetching,
            None => StreamState::Unrecognized,
        });

        match &command {
            Some(command) => debug!(peer = %self.peer, %command, "Received command"),
            None => debug!(peer = %self.peer, line = %line, "Unrecognized command"),
        }

        dispatcher.dispatch(command, &mut self.send).await
    }

    /// Finish the send side. Errors are only logged; the peer may be gone.
    async fn close(&mut self) {
        if let Err(e) = self.send.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Stream shutdown failed");
        }
        self.transition(StreamState::Closed);
    }

    fn transition(&mut self, next: StreamState) {
        trace!(peer = %self.peer, from = %self.state, to = %next, "Stream state");
        self.state = next;
    }
}

/// Serve a single connection: one stream, one command, one reply.
///
/// Returns `None` when no stream was ever opened, which includes the peer
/// closing or the connection idling out first.
pub async fn handle_connection<C>(conn: &C, dispatcher: &Dispatcher) -> Option<Outcome>
where
    C: Connection,
{
    let peer = conn.remote_addr();

    let (send, recv) = match conn.accept_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(peer = %peer, error = %e, "No stream accepted");
            return None;
        }
    };

    match CommandStream::new(send, recv, peer).run(dispatcher).await {
        Ok(outcome) => {
            info!(peer = %peer, %outcome, "Request served");
            Some(outcome)
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "Request failed");
            None
        }
    }
}
