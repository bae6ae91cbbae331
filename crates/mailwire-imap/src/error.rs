//! Error types for the IMAP engine.

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure; the connection is unusable afterwards.
    #[error(transparent)]
    Net(#[from] mailwire_net::Error),

    /// Response parsing error.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Every candidate mechanism was attempted and rejected, or no
    /// usable mechanism exists.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO for a command.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD for a command.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The store has been closed.
    #[error("Store is closed")]
    StoreClosed,

    /// The folder has been closed.
    #[error("Folder is closed")]
    FolderClosed,
}

impl Error {
    /// Returns true if the connection carrying the error must be
    /// discarded rather than returned to the pool.
    #[must_use]
    pub const fn poisons_connection(&self) -> bool {
        match self {
            Self::Net(err) => err.is_fatal(),
            Self::Bye(_) => true,
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
