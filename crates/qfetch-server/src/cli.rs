//! Server CLI implementation.
//!
//! Provides command-line argument parsing for the qfetch server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use qfetch_core::constants::{DEFAULT_PORT, IDLE_TIMEOUT};
use qfetch_core::error::{Error, Result};
use qfetch_core::provision_identity;

use crate::listener::ServerConfig;
use crate::sandbox::BaseDir;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for qfetch_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => qfetch_core::LogFormat::Text,
            CliLogFormat::Json => qfetch_core::LogFormat::Json,
        }
    }
}

/// qfetch server - list and fetch files over QUIC.
#[derive(Debug, Parser)]
#[command(
    name = "qfetch-server",
    version,
    about = "qfetch server - list and fetch files over QUIC"
)]
pub struct Cli {
    /// Directory to serve files from
    #[arg(short = 'd', long = "dir", default_value = ".", value_name = "DIR")]
    pub dir: PathBuf,

    /// Address to listen on
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// UDP port to listen on
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Close connections after this many idle seconds
    #[arg(long = "idle-timeout", default_value = "30", value_name = "SECONDS")]
    pub idle_timeout_secs: u64,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Get the socket address to bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Get the idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Check option combinations clap cannot express.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.idle_timeout_secs == 0 {
            return Err("--idle-timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Build the immutable server configuration.
    ///
    /// Provisions a fresh TLS identity; failures here are fatal to startup.
    pub fn server_config(&self) -> Result<ServerConfig> {
        self.validate().map_err(|message| Error::Config { message })?;

        let base_dir = BaseDir::new(&self.dir)?;
        let identity = provision_identity()?;

        Ok(ServerConfig {
            base_dir,
            listen_addr: self.socket_addr(),
            identity,
            idle_timeout: self.idle_timeout(),
        })
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            idle_timeout_secs: IDLE_TIMEOUT.as_secs(),
            verbose: 0,
            log_file: None,
            log_format: CliLogFormat::Text,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
