//! Error types for authentication exchanges.

use thiserror::Error;

/// Errors raised while evaluating challenges or selecting mechanisms.
#[derive(Debug, Error)]
pub enum Error {
    /// The server challenge could not be parsed.
    #[error("Malformed challenge: {0}")]
    MalformedChallenge(String),

    /// The server's mutual-authentication proof did not verify.
    #[error("Server authentication failed: {0}")]
    ServerProof(String),

    /// No implementation exists for the requested mechanism.
    #[error("Unsupported mechanism: {0}")]
    UnsupportedMechanism(String),

    /// The exchange already produced its final message.
    #[error("Authentication exchange already complete")]
    AlreadyComplete,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
