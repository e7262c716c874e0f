//! Client CLI implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use qfetch_core::constants::CONNECT_TIMEOUT;
use qfetch_core::error::Result;
use qfetch_core::identity::parse_fingerprint;

use crate::ClientOptions;

/// qfetch - list and fetch files from a qfetch server.
#[derive(Debug, Parser)]
#[command(
    name = "qfetch",
    version,
    about = "qfetch - list and fetch files from a qfetch server"
)]
pub struct Cli {
    /// Server address
    #[arg(
        short = 's',
        long = "server",
        default_value = "127.0.0.1:4242",
        global = true
    )]
    pub server: SocketAddr,

    /// Expected SHA-256 fingerprint of the server certificate (hex)
    #[arg(long = "cert-hash", value_name = "HEX", global = true)]
    pub cert_hash: Option<String>,

    /// Connection timeout in seconds
    #[arg(long = "timeout", default_value = "10", value_name = "SECS", global = true)]
    pub timeout_secs: u64,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: ClientCommand,
}

/// Requests the client can make.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum ClientCommand {
    /// List files in the served directory
    Ls,
    /// Fetch one file
    Get {
        /// File name relative to the served directory
        name: String,

        /// Write to this path instead of stdout
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Connection timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build client options, decoding the certificate pin if given.
    pub fn client_options(&self) -> Result<ClientOptions> {
        let cert_hash = self
            .cert_hash
            .as_deref()
            .map(parse_fingerprint)
            .transpose()?;

        Ok(ClientOptions {
            cert_hash,
            connect_timeout: self.connect_timeout(),
        })
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            server: SocketAddr::from(([127, 0, 0, 1], qfetch_core::constants::DEFAULT_PORT)),
            cert_hash: None,
            timeout_secs: CONNECT_TIMEOUT.as_secs(),
            verbose: 0,
            command: ClientCommand::Ls,
        }
    }
}
