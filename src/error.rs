//! Centralized error types for mboxscope.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::record::MessageKey;

/// All errors produced by the mboxscope library.
#[derive(Error, Debug)]
pub enum MboxError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file does not appear to be a valid MBOX.
    #[error("File does not appear to be a valid MBOX: {0}")]
    InvalidMbox(PathBuf),

    /// A single message could not be read back from the archive.
    ///
    /// The scan treats this as "skip"; it is never fatal for a load.
    #[error("Cannot read message {key}: {reason}")]
    MessageRead { key: MessageKey, reason: String },

    /// The message body could not be turned into a displayable document.
    #[error("Render error: {0}")]
    Render(String),
}

/// Convenience alias for `Result<T, MboxError>`.
pub type Result<T> = std::result::Result<T, MboxError>;

impl MboxError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `MessageRead` variant for `key`.
    pub fn message_read(key: MessageKey, reason: impl Into<String>) -> Self {
        Self::MessageRead {
            key,
            reason: reason.into(),
        }
    }
}
