//! Response parsing: lexer plus typed response model.
//!
//! The parser is sans-I/O. [`crate::connection::FramedStream`] reads one
//! complete response (resolving `{n}` literal continuations into the
//! buffer), and [`ResponseParser::parse`] turns those bytes into a
//! [`Response`]. Parsing is a pure function of the input bytes.

pub mod lexer;
mod response;

pub use response::{
    AclEntry, Address, BodyStructure, Envelope, FetchItem, NamespaceEntry, QuotaResource,
    Response, ResponseParser, StatusItem, UntaggedResponse,
};
