//! Error types for qfetch-core.

use thiserror::Error;

/// Main error type for qfetch operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or oversized command.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// QUIC transport failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Certificate generation or TLS configuration failure.
    #[error("certificate error: {message}")]
    Certificate { message: String },

    /// Invalid startup configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A requested name resolves outside the base directory.
    #[error("path escapes base directory: {path}")]
    PathEscape { path: String },

    /// The server answered with an `ERR:` line.
    #[error("server error: {message}")]
    Remote { message: String },

    /// Connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    /// Returns true if this error should stop the process during startup.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Error::Certificate { .. } | Error::Config { .. })
    }
}

/// Convenience result type for qfetch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_path_escape() {
        let err = Error::PathEscape {
            path: "../etc/passwd".into(),
        };
        assert_eq!(
            err.to_string(),
            "path escapes base directory: ../etc/passwd"
        );
    }

    #[test]
    fn error_display_remote() {
        let err = Error::Remote {
            message: "open missing.txt: not found".into(),
        };
        assert_eq!(err.to_string(), "server error: open missing.txt: not found");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn startup_fatal_errors() {
        assert!(Error::Certificate {
            message: "keygen".into()
        }
        .is_startup_fatal());
        assert!(Error::Config {
            message: "no dir".into()
        }
        .is_startup_fatal());

        assert!(!Error::ConnectionClosed.is_startup_fatal());
        assert!(!Error::PathEscape { path: "..".into() }.is_startup_fatal());
    }
}
