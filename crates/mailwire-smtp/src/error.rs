//! Error types for SMTP operations.

use thiserror::Error;

/// Errors that can occur during SMTP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure; the connection is unusable afterwards.
    #[error(transparent)]
    Net(#[from] mailwire_net::Error),

    /// Server returned an error reply for a command.
    #[error("Command {command} failed with {code}: {message}")]
    CommandFailed {
        /// The rejected command verb.
        command: String,
        /// Reply code (e.g. 550).
        code: u16,
        /// Error text from the server.
        message: String,
    },

    /// Malformed reply or unexpected state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Authentication was attempted and rejected on every candidate
    /// mechanism, or required but impossible.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid email address supplied by the caller.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by the server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a command failure from a reply.
    #[must_use]
    pub fn command_failed(command: &str, code: u16, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            code,
            message: message.into(),
        }
    }

    /// Returns true if the connection carrying the error must be
    /// discarded. A 421 reply closes the transmission channel.
    #[must_use]
    pub const fn poisons_connection(&self) -> bool {
        match self {
            Self::Net(err) => err.is_fatal(),
            Self::CommandFailed { code, .. } => *code == 421,
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
