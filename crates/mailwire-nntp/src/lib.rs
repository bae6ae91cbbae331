//! # mailwire-nntp
//!
//! An NNTP (RFC 977 / RFC 3977) client engine on the shared mailwire
//! transport: welcome classification (posting allowed vs read-only),
//! LIST EXTENSIONS capability probing, AUTHINFO in its USER/PASS, SIMPLE,
//! and SASL (RFC 4643) flavours, reader commands, and article POST with
//! the same dot-stuffing and terminator rules as SMTP DATA.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod engine;
mod error;

pub use engine::{GroupStatus, NntpConnection, Reply};
pub use error::{Error, Result};
