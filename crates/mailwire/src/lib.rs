//! # mailwire
//!
//! The session facade over the mailwire protocol engines. An application
//! builds a [`Session`] from one flat property map keyed
//! `mail.<protocol>.<key>`, then obtains message stores (IMAP, POP3) and
//! transports (SMTP, NNTP) from it. Every connection created from one
//! session shares that read-only configuration by reference.
//!
//! ```ignore
//! use std::collections::BTreeMap;
//! use mailwire::Session;
//!
//! let mut props = BTreeMap::new();
//! props.insert("mail.imap.host".into(), "imap.example.com".into());
//! props.insert("mail.imap.ssl.enable".into(), "true".into());
//!
//! let session = Session::new(props);
//! let store = session.imap_store();
//! store.connect("user", "password").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod session;

pub use session::Session;

pub use mailwire_imap as imap;
pub use mailwire_net as net;
pub use mailwire_nntp as nntp;
pub use mailwire_pop3 as pop3;
pub use mailwire_sasl as sasl;
pub use mailwire_smtp as smtp;
