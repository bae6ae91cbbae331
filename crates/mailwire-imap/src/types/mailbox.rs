//! Mailbox names and LIST data.
//!
//! Mailbox names travel on the wire in modified UTF-7 (RFC 3501 §5.1.3):
//! printable ASCII is literal, `&` shifts into base64-encoded UTF-16BE
//! with `,` in place of `/`, and `-` shifts back out. [`Mailbox`] stores
//! the decoded Unicode name and converts at the wire boundary.

use base64::Engine;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};

use crate::{Error, Result};

const MUTF7: GeneralPurpose = GeneralPurpose::new(&base64::alphabet::IMAP_MUTF7, NO_PAD);

/// A mailbox name, held in decoded (Unicode) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(String);

impl Mailbox {
    /// Creates a mailbox from a decoded name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Decodes a wire-form (modified UTF-7) mailbox name.
    ///
    /// # Errors
    ///
    /// Returns a parse error when a base64 section is malformed.
    pub fn from_wire(encoded: &str) -> Result<Self> {
        decode_utf7(encoded).map(Self)
    }

    /// Returns the decoded name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encodes the name to its wire form.
    #[must_use]
    pub fn to_wire(&self) -> String {
        encode_utf7(&self.0)
    }

    /// Returns true for the special-cased INBOX name (case-insensitive).
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0.eq_ignore_ascii_case("INBOX")
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encodes a Unicode mailbox name into modified UTF-7.
#[must_use]
pub fn encode_utf7(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending: Vec<u8> = Vec::new();

    let flush = |out: &mut String, pending: &mut Vec<u8>| {
        if !pending.is_empty() {
            out.push('&');
            out.push_str(&MUTF7.encode(&pending));
            out.push('-');
            pending.clear();
        }
    };

    for ch in name.chars() {
        if ('\x20'..='\x7e').contains(&ch) {
            flush(&mut out, &mut pending);
            if ch == '&' {
                out.push_str("&-");
            } else {
                out.push(ch);
            }
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                pending.extend_from_slice(&unit.to_be_bytes());
            }
        }
    }
    flush(&mut out, &mut pending);

    out
}

/// Decodes a modified UTF-7 mailbox name.
///
/// # Errors
///
/// Returns a parse error on an unterminated shift, malformed base64, or
/// an invalid UTF-16 sequence.
pub fn decode_utf7(encoded: &str) -> Result<String> {
    let malformed = |message: &str| Error::Parse {
        position: 0,
        message: format!("{message} in mailbox name {encoded:?}"),
    };

    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();

    while let Some(ch) = chars.next() {
        if ch != '&' {
            out.push(ch);
            continue;
        }

        let mut section = String::new();
        loop {
            match chars.next() {
                Some('-') => break,
                Some(c) => section.push(c),
                None => return Err(malformed("unterminated UTF-7 shift")),
            }
        }

        if section.is_empty() {
            out.push('&');
            continue;
        }

        let bytes = MUTF7
            .decode(section.as_bytes())
            .map_err(|_| malformed("invalid base64"))?;
        if bytes.len() % 2 != 0 {
            return Err(malformed("odd UTF-16 byte count"));
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let decoded = String::from_utf16(&units).map_err(|_| malformed("invalid UTF-16"))?;
        out.push_str(&decoded);
    }

    Ok(out)
}

/// Mailbox attribute from a LIST or LSUB response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    Noselect,
    /// Mailbox cannot have children.
    Noinferiors,
    /// Mailbox is marked as interesting.
    Marked,
    /// Mailbox has no new messages.
    Unmarked,
    /// Mailbox has child mailboxes.
    HasChildren,
    /// Mailbox has no child mailboxes.
    HasNoChildren,
    /// Any other attribute.
    Other(String),
}

impl MailboxAttribute {
    /// Parses an attribute atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::Noselect,
            "\\NOINFERIORS" => Self::Noinferiors,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            _ => Self::Other(s.to_string()),
        }
    }
}

/// One LIST or LSUB response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// The mailbox name, decoded.
    pub mailbox: Mailbox,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_roundtrip() {
        assert_eq!(encode_utf7("INBOX/Sent"), "INBOX/Sent");
        assert_eq!(decode_utf7("INBOX/Sent").unwrap(), "INBOX/Sent");
    }

    #[test]
    fn test_ampersand() {
        assert_eq!(encode_utf7("Mail & More"), "Mail &- More");
        assert_eq!(decode_utf7("Mail &- More").unwrap(), "Mail & More");
    }

    #[test]
    fn test_rfc3501_example() {
        // RFC 3501 §5.1.3 example: "~peter/mail/台北/日本語".
        let decoded = "~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}";
        let encoded = "~peter/mail/&U,BTFw-/&ZeVnLIqe-";
        assert_eq!(encode_utf7(decoded), encoded);
        assert_eq!(decode_utf7(encoded).unwrap(), decoded);
    }

    #[test]
    fn test_unterminated_shift_rejected() {
        assert!(decode_utf7("Inbox&AOk").is_err());
    }

    #[test]
    fn test_mailbox_wire_roundtrip() {
        let mailbox = Mailbox::new("Entw\u{fc}rfe");
        let wire = mailbox.to_wire();
        assert_eq!(Mailbox::from_wire(&wire).unwrap(), mailbox);
    }

    #[test]
    fn test_is_inbox() {
        assert!(Mailbox::new("inbox").is_inbox());
        assert!(Mailbox::new("INBOX").is_inbox());
        assert!(!Mailbox::new("INBOX/Sub").is_inbox());
    }

    #[test]
    fn test_attribute_parse() {
        assert_eq!(
            MailboxAttribute::parse("\\HasChildren"),
            MailboxAttribute::HasChildren
        );
        assert_eq!(
            MailboxAttribute::parse("\\Noselect"),
            MailboxAttribute::Noselect
        );
        assert!(matches!(
            MailboxAttribute::parse("\\Junk"),
            MailboxAttribute::Other(_)
        ));
    }
}
