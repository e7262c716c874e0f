//! qfetch-server: QUIC file listing and retrieval server.
//!
//! Provides:
//! - Connection acceptor with one task per connection
//! - Single-command stream handler
//! - `ls` / `get` dispatcher confined to one base directory

pub mod cli;
pub mod dispatch;
pub mod handler;
pub mod listener;
pub mod sandbox;

pub use cli::Cli;
pub use dispatch::{Dispatcher, Outcome};
pub use handler::{handle_connection, CommandStream, StreamState};
pub use listener::{serve, FileListener, ServerConfig, ShutdownHandle};
pub use sandbox::BaseDir;
