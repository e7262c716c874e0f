//! Protocol and configuration constants for qfetch.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// ALPN identifier negotiated on every QUIC connection.
pub const ALPN: &[u8] = b"data-transfer";

/// Command keyword for a directory listing.
pub const CMD_LIST: &str = "ls";

/// Command prefix for a file fetch. The file name follows verbatim.
pub const CMD_GET_PREFIX: &str = "get ";

/// Prefix of a command-level error line written back to the peer.
pub const ERR_PREFIX: &str = "ERR: ";

/// Maximum command line length in bytes, newline included.
pub const MAX_COMMAND_LEN: usize = 4096;

// =============================================================================
// Identity Constants
// =============================================================================

/// Organization placed in the certificate subject.
pub const CERT_ORGANIZATION: &str = "QUIC Server";

/// Subject alternative name on the certificate. Clients connect using this name.
pub const SERVER_NAME: &str = "localhost";

/// Certificate validity window.
pub const CERT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// =============================================================================
// Network Defaults
// =============================================================================

/// Default UDP port for the listener.
pub const DEFAULT_PORT: u16 = 4242;

/// QUIC idle timeout. Bounds how long a silent peer can hold a connection.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
