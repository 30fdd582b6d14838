//! Error types for the rolling file writer

use std::io;
use std::path::PathBuf;

/// Result type for rolling file operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the rolling file writer
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    Roll {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new active file could not be opened and the old one could not be
    /// moved back; the writer keeps appending to `from`.
    #[error("Failed to restore {} to {} after a failed roll: {source}", from.display(), to.display())]
    Restore {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Rolling file writer is closed")]
    Closed,
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
