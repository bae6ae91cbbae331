//! # mailwire-net
//!
//! The connection substrate shared by every mailwire protocol engine:
//!
//! - [`MailStream`]: a socket that is either plaintext TCP or TLS, with
//!   mid-session STARTTLS upgrade over the same connection
//! - [`StreamFactory`]: a typed factory seam for custom socket creation,
//!   with an opt-in one-shot fallback to the built-in rustls factory
//! - [`TextStream`]: buffered CRLF line framing with per-read deadlines,
//!   dot-stuffed multi-line reads and writes (POP3, SMTP, NNTP)
//! - [`TraceStream`]: a transparent wrapper that mirrors wire traffic to
//!   the `tracing` subscriber for protocol debugging
//! - [`Capabilities`]: the server-advertised feature map populated after
//!   EHLO / CAPA / LIST EXTENSIONS
//! - [`ProtocolConfig`]: the read-only `mail.<protocol>.<key>` option view
//!
//! The protocol crates (`mailwire-imap`, `mailwire-pop3`, `mailwire-smtp`,
//! `mailwire-nntp`) embed these types rather than inheriting from a common
//! connection class; each engine owns exactly one stream.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod capability;
pub mod config;
mod error;
pub mod factory;
pub mod stream;
pub mod text;
pub mod trace;

pub use capability::Capabilities;
pub use config::ProtocolConfig;
pub use error::{Error, Result};
pub use factory::{RustlsFactory, StreamFactory};
pub use stream::{MailStream, TlsSettings, connect, connect_plain, connect_tls};
pub use text::{TextStream, dot_stuff, dot_stuffed_len};
pub use trace::TraceStream;
