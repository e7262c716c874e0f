//! Command dispatcher.
//!
//! Executes a parsed [`Command`] against the base directory and writes the
//! reply onto the stream. Command-level failures become a single `ERR:` line;
//! only stream write failures are returned as errors.

use std::fmt;

use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use qfetch_core::error::Result;
use qfetch_core::protocol::error_line;
use qfetch_core::Command;

use crate::sandbox::BaseDir;

/// Buffer size for file reads.
const FILE_BUFFER_SIZE: usize = 256 * 1024;

/// Reply sent for anything that is neither `ls` nor `get <path>`.
pub const UNKNOWN_COMMAND: &str = "unknown command";

/// What a single stream exchange produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Listing written with this many names.
    Listed { entries: usize },
    /// File content copied.
    Fetched { bytes: u64 },
    /// An `ERR:` line was written instead of file content.
    Rejected { reason: String },
    /// The command was not understood; an `ERR:` line was written.
    Unrecognized,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Listed { entries } => write!(f, "listed {} entries", entries),
            Outcome::Fetched { bytes } => write!(f, "sent {} bytes", bytes),
            Outcome::Rejected { reason } => write!(f, "rejected: {}", reason),
            Outcome::Unrecognized => f.write_str("unrecognized command"),
        }
    }
}

/// Runs commands against one base directory.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    base_dir: BaseDir,
}

impl Dispatcher {
    /// Create a dispatcher serving `base_dir`.
    pub fn new(base_dir: BaseDir) -> Self {
        Self { base_dir }
    }

    /// The directory being served.
    pub fn base_dir(&self) -> &BaseDir {
        &self.base_dir
    }

    /// Execute `command` (`None` = unrecognized) and write its reply.
    pub async fn dispatch<W>(&self, command: Option<Command>, out: &mut W) -> Result<Outcome>
    where
        W: AsyncWrite + Unpin,
    {
        match command {
            Some(Command::List) => self.list(out).await,
            Some(Command::Get(name)) => self.get(&name, out).await,
            None => {
                write_error(out, UNKNOWN_COMMAND).await?;
                Ok(Outcome::Unrecognized)
            }
        }
    }

    /// Write one `<name>\n` line per non-directory entry of the base directory.
    ///
    /// Names containing a newline cannot be framed and are left out.
    ///
    /// Order is whatever the OS returns. A read failure ends the listing early
    /// without writing anything about it.
    pub async fn list<W>(&self, out: &mut W) -> Result<Outcome>
    where
        W: AsyncWrite + Unpin,
    {
        let mut entries = match fs::read_dir(self.base_dir.path()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.base_dir.path().display(), error = %e, "Cannot read base directory");
                out.flush().await?;
                return Ok(Outcome::Listed { entries: 0 });
            }
        };

        let mut count = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Directory listing stopped early");
                    break;
                }
            };

            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => continue,
                Ok(_) => {}
                Err(e) => {
                    debug!(entry = ?entry.file_name(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            }

            let mut line = entry.file_name().to_string_lossy().into_owned();
            if line.contains('\n') {
                debug!(entry = ?entry.file_name(), "Skipping name that breaks line framing");
                continue;
            }
            line.push('\n');
            out.write_all(line.as_bytes()).await?;
            count += 1;
        }

        out.flush().await?;
        Ok(Outcome::Listed { entries: count })
    }

    /// Copy the named file onto `out`, or write one `ERR:` line.
    pub async fn get<W>(&self, name: &str, out: &mut W) -> Result<Outcome>
    where
        W: AsyncWrite + Unpin,
    {
        let path = match self.base_dir.resolve(name) {
            Ok(path) => path,
            Err(e) => {
                warn!(name, "Rejected path outside base directory");
                return reject(out, e.to_string()).await;
            }
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => return reject(out, format!("open {}: {}", name, e)).await,
        };

        match file.metadata().await {
            Ok(meta) if meta.is_dir() => {
                return reject(out, format!("open {}: is a directory", name)).await;
            }
            Ok(_) => {}
            Err(e) => return reject(out, format!("stat {}: {}", name, e)).await,
        }

        let mut reader = BufReader::with_capacity(FILE_BUFFER_SIZE, file);
        let bytes = tokio::io::copy_buf(&mut reader, out).await?;
        out.flush().await?;

        Ok(Outcome::Fetched { bytes })
    }
}

async fn write_error<W>(out: &mut W, message: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(error_line(message).as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn reject<W>(out: &mut W, reason: String) -> Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    debug!(reason = %reason, "Sending error line");
    write_error(out, &reason).await?;
    Ok(Outcome::Rejected { reason })
}
