//! Command grammar and line framing.
//!
//! A request is one text line on a fresh stream:
//!
//! ```text
//! ls\n            -> zero or more "<name>\n" lines
//! get <path>\n    -> raw file bytes until end of stream
//!                 -> or a single "ERR: <message>\n" line
//! ```
//!
//! `<path>` is everything after the four byte `get ` prefix, taken verbatim.

use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::constants::{CMD_GET_PREFIX, CMD_LIST, ERR_PREFIX, MAX_COMMAND_LEN};
use crate::error::{Error, Result};

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List regular entries of the base directory.
    List,
    /// Fetch one file. The name is untrusted peer input.
    Get(String),
}

impl Command {
    /// Parse a trimmed command line. `None` means the line is not understood.
    pub fn parse(line: &str) -> Option<Command> {
        if line == CMD_LIST {
            return Some(Command::List);
        }
        line.strip_prefix(CMD_GET_PREFIX)
            .map(|name| Command::Get(name.to_string()))
    }

    /// Encode as a newline-terminated request line.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::List => f.write_str(CMD_LIST),
            Command::Get(name) => write!(f, "{}{}", CMD_GET_PREFIX, name),
        }
    }
}

/// Read one command line and trim surrounding whitespace.
///
/// Reads up to and including the first `\n`, never more than
/// [`MAX_COMMAND_LEN`] bytes. End of stream before any data gives an empty
/// string. A line that hits the limit without a newline is a protocol error.
pub async fn read_command_line<R>(recv: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(128);
    let mut reader = BufReader::new(recv.take(MAX_COMMAND_LEN as u64));
    reader.read_until(b'\n', &mut buf).await?;

    if buf.len() >= MAX_COMMAND_LEN && buf.last() != Some(&b'\n') {
        return Err(Error::Protocol {
            message: "command too long".to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

/// Format a command-level error as a single `ERR:` line.
///
/// Embedded line breaks are flattened so the reply stays one line.
pub fn error_line(message: &str) -> String {
    let flat: String = message
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    format!("{}{}\n", ERR_PREFIX, flat)
}

/// Recognize a complete reply consisting of exactly one `ERR:` line.
///
/// Returns the message without prefix or newline.
pub fn parse_error_line(reply: &[u8]) -> Option<String> {
    let body = reply.strip_prefix(ERR_PREFIX.as_bytes())?;
    let body = body.strip_suffix(b"\n")?;
    if body.contains(&b'\n') {
        return None;
    }
    Some(String::from_utf8_lossy(body).into_owned())
}
