//! Error types for the transport layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while opening or using a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A read or write exceeded the configured deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection mid-exchange.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The connection was closed and cannot be used again.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The stream is in the wrong state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A transport configuration value could not be applied.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the underlying connection must be discarded.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Timeout(_) | Self::UnexpectedEof | Self::ConnectionLost(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
