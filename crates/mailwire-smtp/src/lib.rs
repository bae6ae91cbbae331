//! # mailwire-smtp
//!
//! An ESMTP (RFC 5321) client engine on the shared mailwire transport:
//!
//! - EHLO with HELO fallback, extension map (STARTTLS, SIZE, 8BITMIME,
//!   DSN, AUTH, legacy `AUTH=`)
//! - STARTTLS upgrade with a fresh EHLO afterwards
//! - AUTH through the `mailwire-sasl` mechanisms and selection policy
//! - MAIL FROM parameters: `BODY=8BITMIME`, `SIZE=`, `RET=`, `AUTH=`
//!   (xtext), SUBMITTER, and a free-form extension token
//! - the RFC 2045 8-bit suitability test and quoted-printable/base64
//!   part conversion through an injected MIME boundary
//! - per-recipient [`SendStatus`], dot-stuffed DATA with a doubled
//!   final-reply deadline, `quitwait`, and RSET-based session reuse
//!
//! The message object model is not this crate's business: callers hand
//! in anything implementing [`MimeMessage`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod eightbit;
pub mod engine;
mod error;
pub mod mime;
pub mod types;

pub use eightbit::{convert_to_8bit, is_8bit_clean};
pub use engine::{SendError, SmtpConnection, Transport};
pub use error::{Error, Result};
pub use mime::{MimeMessage, MimePart};
pub use types::{Address, Reply, ReplyCode, SendResult, SendStatus};
