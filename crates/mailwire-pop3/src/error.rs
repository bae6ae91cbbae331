//! Error types for POP3 operations.

use thiserror::Error;

/// Errors that can occur during POP3 operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure; the connection is unusable afterwards.
    #[error(transparent)]
    Net(#[from] mailwire_net::Error),

    /// Server answered `-ERR`.
    #[error("Command {command} failed: {reply}")]
    CommandFailed {
        /// The command that was rejected (secrets redacted).
        command: String,
        /// The server's error text.
        reply: String,
    },

    /// Authentication was rejected by every applicable path.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Malformed response or unexpected state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation on a closed store.
    #[error("Store is closed")]
    StoreClosed,

    /// Operation on a closed folder.
    #[error("Folder is closed")]
    FolderClosed,

    /// Write operation on a read-only folder.
    #[error("Folder is read-only")]
    ReadOnly,
}

impl Error {
    /// Returns true if the connection carrying the error must be
    /// discarded.
    #[must_use]
    pub const fn poisons_connection(&self) -> bool {
        matches!(self, Self::Net(err) if err.is_fatal())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
