//! Error types for NNTP operations.

use thiserror::Error;

/// Errors that can occur during NNTP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure; the connection is unusable afterwards.
    #[error(transparent)]
    Net(#[from] mailwire_net::Error),

    /// Server returned an error status for a command.
    #[error("Command {command} failed with {code}: {message}")]
    CommandFailed {
        /// The rejected command verb.
        command: String,
        /// Status code (e.g. 441).
        code: u16,
        /// Error text from the server.
        message: String,
    },

    /// Authentication was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Malformed response or unexpected state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Posting attempted on a read-only connection.
    #[error("Posting is not allowed on this server")]
    PostingNotAllowed,
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
