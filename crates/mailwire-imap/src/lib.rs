//! # mailwire-imap
//!
//! An IMAP4rev1 (RFC 3501) client engine built on the shared mailwire
//! transport:
//!
//! - **Byte-accurate response parser**: a lexer over complete responses
//!   (literals `{n}` resolved by the framed reader), typed untagged and
//!   tagged response values, recursive BODYSTRUCTURE, strict envelopes
//! - **Tagged command engine**: monotonic tags, literal arguments with
//!   continuation waits, unsolicited-response dispatch in arrival order
//! - **Store / Folder model**: a bounded connection pool validated with
//!   NOOP, folders that borrow a connection per request, close-time
//!   expunge for read-write folders
//! - **Authentication**: LOGIN plus the SASL mechanisms from
//!   `mailwire-sasl` behind the standard selection policy
//!
//! ## Modules
//!
//! - [`command`]: command builders, tags, fetch/search/store arguments
//! - [`connection`]: literal-aware framing over [`mailwire_net::MailStream`]
//! - [`engine`]: the per-connection command loop and high-level operations
//! - [`parser`]: the response lexer and typed response model
//! - [`store`]: pool, store, and folder lifecycle
//! - [`types`]: flags, mailboxes, identifiers, sequence sets

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod engine;
mod error;
pub mod handler;
pub mod parser;
pub mod pool;
pub mod store;
pub mod types;

pub use command::{
    Command, CommandPart, FetchAttribute, FetchItems, SearchCriteria, StatusQuery, StoreAction,
    TagGenerator,
};
pub use connection::FramedStream;
pub use engine::{CommandOutcome, ImapConnection, MailboxStatus};
pub use error::{Error, Result};
pub use handler::{Dispatch, UnsolicitedHandler};
pub use parser::{
    Address, BodyStructure, Envelope, FetchItem, Response, ResponseParser, StatusItem,
    UntaggedResponse,
};
pub use pool::Pool;
pub use store::{Folder, OpenMode, Store};
pub use types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, ResponseCode, SeqNum,
    SequenceSet, Status, Tag, Uid, UidValidity,
};

/// IMAP protocol version implemented by this crate.
pub const IMAP_VERSION: &str = "IMAP4rev1";
