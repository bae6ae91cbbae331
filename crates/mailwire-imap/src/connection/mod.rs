//! Connection-level framing for IMAP.

mod framed;

pub use framed::FramedStream;
