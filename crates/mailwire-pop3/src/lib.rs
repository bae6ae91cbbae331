//! # mailwire-pop3
//!
//! A POP3 (RFC 1939) client engine on the shared mailwire transport,
//! with the CAPA, STLS (RFC 2595), and AUTH (RFC 5034) extensions.
//!
//! The engine speaks the three-status discipline (`+OK`, `-ERR`, bare `+`
//! challenges), reads dot-stuffed multi-line bodies, and authenticates by
//! policy: APOP when enabled and the greeting carries a timestamp, the
//! SASL bridge when `auth.enable` is set, USER/PASS otherwise.
//!
//! The store keeps at most one idle connection. A folder takes that
//! connection for its whole open lifetime, because staged DELE commands
//! are per-session state that QUIT commits.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod engine;
mod error;
pub mod store;

pub use engine::{Pop3Connection, Reply};
pub use error::{Error, Result};
pub use store::{Folder, OpenMode, Pop3Message, Store};
