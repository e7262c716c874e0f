//! qfetch-core: Shared library for the qfetch file service.
//!
//! This crate provides:
//! - Command grammar and line framing
//! - Ephemeral TLS identity generation
//! - Transport abstraction and the QUIC implementation
//! - Error type and logging setup

pub mod constants;
pub mod error;
pub mod identity;
pub mod logging;
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};
pub use identity::{provision_identity, TlsIdentity};
pub use logging::{init_logging, LogFormat};
pub use protocol::Command;
