//! # mailwire-sasl
//!
//! Authentication mechanisms shared by the POP3, IMAP, SMTP, and NNTP
//! engines: PLAIN, LOGIN, CRAM-MD5, DIGEST-MD5, and XOAUTH2, plus the
//! APOP digest and the mechanism selection policy.
//!
//! Each mechanism implements [`Authenticator`]: the engine drives the
//! challenge/response exchange (base64 framing is the engine's job — the
//! trait deals in raw bytes) and asks [`select::ranked`] which mechanisms
//! to try, in order. A server rejection of one mechanism is recoverable:
//! the engine drops to the next candidate and only reports authentication
//! failure once the list is exhausted.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod apop;
mod cram_md5;
mod digest_md5;
mod error;
mod login;
mod plain;
pub mod select;
mod xoauth2;

pub use cram_md5::CramMd5;
pub use digest_md5::DigestMd5;
pub use error::{Error, Result};
pub use login::Login;
pub use plain::Plain;
pub use select::{ranked, try_create};
pub use xoauth2::XOAuth2;

/// A pluggable authentication mechanism.
///
/// The exchange deals in raw bytes; wire framing (base64, line
/// termination, `AUTH`/`AUTHENTICATE`/`AUTHINFO SASL` command syntax) is
/// the calling engine's responsibility.
pub trait Authenticator: Send {
    /// The IANA mechanism name, e.g. `CRAM-MD5`.
    fn mechanism(&self) -> &'static str;

    /// Whether the client sends an initial response with the command that
    /// starts authentication.
    fn has_initial_response(&self) -> bool;

    /// Whether the exchange has produced its final client message.
    fn is_complete(&self) -> bool;

    /// Evaluates a server challenge (possibly empty) and returns the raw
    /// next client message.
    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;
}

/// Answers credential questions during an exchange.
///
/// The default implementations cover the common case; DIGEST-MD5 consults
/// `realm`/`realm_choice` when the server offers realms.
pub trait CredentialCallback: Send + Sync {
    /// The authentication user name.
    fn user(&self) -> String;

    /// The password or bearer token.
    fn password(&self) -> String;

    /// The authorization id; defaults to the user name.
    fn authzid(&self) -> String {
        self.user()
    }

    /// The realm to use when the server names a default.
    fn realm(&self, default: &str) -> String {
        default.to_string()
    }

    /// Picks one of several server-offered realms.
    fn realm_choice(&self, _choices: &[String], default: usize) -> usize {
        default
    }
}

/// Fixed username/password credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Authentication user name.
    pub username: String,
    /// Password, or the bearer token for XOAUTH2.
    pub password: String,
    /// Authorization id override (`sasl.authorizationid`).
    pub authzid: Option<String>,
    /// Realm override (`sasl.realm`).
    pub realm: Option<String>,
}

impl Credentials {
    /// Creates credentials with the authzid defaulting to the username.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            authzid: None,
            realm: None,
        }
    }
}

impl CredentialCallback for Credentials {
    fn user(&self) -> String {
        self.username.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }

    fn authzid(&self) -> String {
        self.authzid.clone().unwrap_or_else(|| self.username.clone())
    }

    fn realm(&self, default: &str) -> String {
        self.realm.clone().unwrap_or_else(|| default.to_string())
    }
}
