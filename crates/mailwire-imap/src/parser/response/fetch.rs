//! FETCH response parsing.

use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;
use crate::{Error, Result};

use super::parse_flag_list;
use super::types::{Address, BodyStructure, Envelope, FetchItem};

/// Parses the parenthesized item list of a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                let upper = name.to_uppercase();
                match upper.as_str() {
                    "FLAGS" => {
                        lexer.expect_space()?;
                        let flags = parse_flag_list(lexer)?;
                        items.push(FetchItem::Flags(flags));
                    }
                    "UID" => {
                        lexer.expect_space()?;
                        let n = lexer.read_number()?;
                        let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "UID cannot be 0".to_string(),
                        })?;
                        items.push(FetchItem::Uid(uid));
                    }
                    "RFC822.SIZE" => {
                        lexer.expect_space()?;
                        let size = lexer.read_number()?;
                        items.push(FetchItem::Rfc822Size(size));
                    }
                    "INTERNALDATE" => {
                        lexer.expect_space()?;
                        match lexer.next_token()? {
                            Token::QuotedString(date) => {
                                items.push(FetchItem::InternalDate(date));
                            }
                            token => {
                                return Err(Error::Parse {
                                    position: lexer.position(),
                                    message: format!("Expected date string, got {token:?}"),
                                });
                            }
                        }
                    }
                    "ENVELOPE" => {
                        lexer.expect_space()?;
                        let envelope = parse_envelope(lexer)?;
                        items.push(FetchItem::Envelope(Box::new(envelope)));
                    }
                    "BODYSTRUCTURE" => {
                        lexer.expect_space()?;
                        let body_structure = parse_body_structure(lexer)?;
                        items.push(FetchItem::BodyStructure(body_structure));
                    }
                    "BODY" => {
                        // BODY without a section is a non-extensible
                        // BODYSTRUCTURE; with one it carries section data.
                        if lexer.peek() == Some(b' ') {
                            lexer.advance();
                            let body_structure = parse_body_structure(lexer)?;
                            items.push(FetchItem::BodyStructure(body_structure));
                        } else {
                            let (section, origin) = parse_body_section_and_origin(lexer)?;
                            lexer.expect_space()?;
                            let data = lexer.read_nstring_bytes()?;
                            items.push(FetchItem::Body {
                                section,
                                origin,
                                data,
                            });
                        }
                    }
                    "RFC822" => {
                        lexer.expect_space()?;
                        let data = lexer.read_nstring_bytes()?;
                        items.push(FetchItem::Body {
                            section: None,
                            origin: None,
                            data,
                        });
                    }
                    "RFC822.HEADER" => {
                        lexer.expect_space()?;
                        let data = lexer.read_nstring_bytes()?.unwrap_or_default();
                        items.push(FetchItem::Header(data));
                    }
                    "RFC822.TEXT" => {
                        lexer.expect_space()?;
                        let data = lexer.read_nstring_bytes()?.unwrap_or_default();
                        items.push(FetchItem::Text(data));
                    }
                    _ => {
                        skip_fetch_item(lexer)?;
                    }
                }
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in FETCH: {token:?}"),
                });
            }
        }
    }

    Ok(items)
}

/// Parses optional `[section]` and `<origin>` after BODY.
fn parse_body_section_and_origin(lexer: &mut Lexer<'_>) -> Result<(Option<String>, Option<u32>)> {
    let mut section = None;
    let mut origin = None;

    if lexer.peek() == Some(b'[') {
        lexer.advance();

        let mut section_buf = String::new();
        loop {
            match lexer.peek() {
                Some(b']') => {
                    lexer.advance();
                    break;
                }
                Some(b) => {
                    section_buf.push(b as char);
                    lexer.advance();
                }
                None => break,
            }
        }

        if !section_buf.is_empty() {
            section = Some(section_buf);
        }
    }

    if lexer.peek() == Some(b'<') {
        lexer.advance();

        let mut origin_buf = String::new();
        loop {
            match lexer.peek() {
                Some(b'>') => {
                    lexer.advance();
                    break;
                }
                Some(b) if b.is_ascii_digit() => {
                    origin_buf.push(b as char);
                    lexer.advance();
                }
                _ => break,
            }
        }

        if !origin_buf.is_empty() {
            origin = origin_buf.parse().ok();
        }
    }

    Ok((section, origin))
}

/// Parses an envelope in strict RFC 3501 field order: date, subject,
/// from, sender, reply-to, to, cc, bcc, in-reply-to, message-id.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;

    let date = lexer.read_nstring()?;
    lexer.expect_space()?;

    let subject = lexer.read_nstring()?;
    lexer.expect_space()?;

    let from = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let sender = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let reply_to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let cc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let bcc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;

    let message_id = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

/// Parses an address list (NIL or parenthesized addresses).
pub fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();

            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b'(') => {
                        addresses.push(parse_address(lexer)?);
                    }
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => break,
                }
            }

            Ok(addresses)
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("Expected address list, got {token:?}"),
        }),
    }
}

/// Parses a single address quadruple.
pub fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;

    let name = lexer.read_nstring()?;
    lexer.expect_space()?;

    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;

    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;

    let host = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
}

/// Parses a BODYSTRUCTURE.
///
/// Required fields are never defaulted: a NIL media type, subtype, or
/// transfer encoding on a non-multipart body is a parse error.
pub fn parse_body_structure(lexer: &mut Lexer<'_>) -> Result<BodyStructure> {
    lexer.expect(Token::LParen)?;

    if lexer.peek() == Some(b'(') {
        // Multipart: parts back to back, then the subtype.
        let mut parts = Vec::new();
        while lexer.peek() == Some(b'(') {
            parts.push(parse_body_structure(lexer)?);
            if lexer.peek() == Some(b' ') {
                lexer.advance();
            }
        }

        let subtype = require_string(lexer, "multipart subtype")?.to_uppercase();

        skip_to_close_paren(lexer)?;

        Ok(BodyStructure::Multipart {
            bodies: parts,
            subtype,
        })
    } else {
        let media_type = require_string(lexer, "media type")?.to_uppercase();
        lexer.expect_space()?;

        let media_subtype = require_string(lexer, "media subtype")?.to_uppercase();
        lexer.expect_space()?;

        let params = parse_body_params(lexer)?;
        lexer.expect_space()?;

        let id = lexer.read_nstring()?;
        lexer.expect_space()?;

        let description = lexer.read_nstring()?;
        lexer.expect_space()?;

        let encoding = require_string(lexer, "transfer encoding")?;
        lexer.expect_space()?;

        let size = lexer.read_number()?;

        if media_type == "MESSAGE" && media_subtype == "RFC822" {
            lexer.expect_space()?;
            let envelope = parse_envelope(lexer)?;
            lexer.expect_space()?;
            let body = parse_body_structure(lexer)?;
            lexer.expect_space()?;
            let lines = lexer.read_number()?;

            skip_to_close_paren(lexer)?;

            return Ok(BodyStructure::Message {
                envelope: Box::new(envelope),
                body: Box::new(body),
                lines,
            });
        }

        let lines = if media_type == "TEXT" {
            lexer.expect_space()?;
            lexer.read_number()?
        } else {
            0
        };

        // Extension data (MD5, disposition, language, location) follows.
        skip_to_close_paren(lexer)?;

        if media_type == "TEXT" {
            Ok(BodyStructure::Text {
                subtype: media_subtype,
                params,
                id,
                description,
                encoding,
                size,
                lines,
            })
        } else {
            Ok(BodyStructure::Basic {
                media_type,
                media_subtype,
                params,
                id,
                description,
                encoding,
                size,
            })
        }
    }
}

/// Reads a string field that must not be NIL.
fn require_string(lexer: &mut Lexer<'_>, what: &str) -> Result<String> {
    lexer.read_nstring()?.ok_or_else(|| Error::Parse {
        position: lexer.position(),
        message: format!("NIL {what} in BODYSTRUCTURE"),
    })
}

/// Parses body parameters (NIL or (key value key value ...)).
fn parse_body_params(lexer: &mut Lexer<'_>) -> Result<Vec<(String, String)>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut params = Vec::new();
            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => {
                        let key = lexer.read_nstring()?.unwrap_or_default();
                        if lexer.peek() == Some(b' ') {
                            lexer.advance();
                        }
                        let value = lexer.read_nstring()?.unwrap_or_default();
                        params.push((key, value));
                    }
                }
            }
            Ok(params)
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("Expected body params, got {token:?}"),
        }),
    }
}

/// Skips to the closing parenthesis at the current nesting level.
fn skip_to_close_paren(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 1;
    while depth > 0 {
        match lexer.peek() {
            Some(b'(') => {
                depth += 1;
                lexer.advance();
            }
            Some(b')') => {
                depth -= 1;
                lexer.advance();
            }
            Some(b'{') => {
                let _ = lexer.next_token()?;
            }
            Some(_) => {
                lexer.advance();
            }
            None => break,
        }
    }
    Ok(())
}

/// Skips an unknown fetch item value.
pub fn skip_fetch_item(lexer: &mut Lexer<'_>) -> Result<()> {
    if lexer.peek() == Some(b' ') {
        lexer.advance();
    }

    let mut paren_depth = 0;

    loop {
        match lexer.peek() {
            Some(b'(') => {
                paren_depth += 1;
                lexer.advance();
            }
            Some(b')') => {
                if paren_depth == 0 {
                    break;
                }
                paren_depth -= 1;
                lexer.advance();
            }
            Some(b' ') if paren_depth == 0 => break,
            Some(b'{') => {
                let _ = lexer.next_token()?;
            }
            Some(_) => {
                lexer.advance();
            }
            None => break,
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;

    #[test]
    fn test_fetch_uid_and_flags() {
        let mut lexer = Lexer::new(b"(UID 123 FLAGS (\\Seen))");
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 123));
        assert!(matches!(&items[1], FetchItem::Flags(f) if f.is_seen()));
    }

    #[test]
    fn test_fetch_uid_zero_rejected() {
        let mut lexer = Lexer::new(b"(UID 0)");
        assert!(parse_fetch_response(&mut lexer).is_err());
    }

    #[test]
    fn test_fetch_body_section_literal() {
        let mut lexer =
            Lexer::new(b"(BODY[HEADER] {23}\r\nSubject: hi\r\nDate: x\r\n\r\n)");
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 1);
        match &items[0] {
            FetchItem::Body {
                section,
                origin,
                data,
            } => {
                assert_eq!(section.as_deref(), Some("HEADER"));
                assert!(origin.is_none());
                assert_eq!(
                    data.as_deref(),
                    Some(b"Subject: hi\r\nDate: x\r\n\r\n".as_slice())
                );
            }
            other => panic!("Expected Body, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_partial_body_origin() {
        let mut lexer = Lexer::new(b"(BODY[1]<100> {3}\r\nabc)");
        let items = parse_fetch_response(&mut lexer).unwrap();

        match &items[0] {
            FetchItem::Body {
                section, origin, ..
            } => {
                assert_eq!(section.as_deref(), Some("1"));
                assert_eq!(*origin, Some(100));
            }
            other => panic!("Expected Body, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_rfc822_header() {
        let mut lexer = Lexer::new(b"(RFC822.HEADER {4}\r\nX: y)");
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert!(matches!(&items[0], FetchItem::Header(h) if h == b"X: y"));
    }

    #[test]
    fn test_parse_envelope_order() {
        let mut lexer = Lexer::new(
            b"(\"date\" \"subject\" ((\"A\" NIL \"a\" \"x.org\")) NIL NIL NIL NIL NIL \"irt\" \"mid\")",
        );
        let envelope = parse_envelope(&mut lexer).unwrap();

        assert_eq!(envelope.date.as_deref(), Some("date"));
        assert_eq!(envelope.subject.as_deref(), Some("subject"));
        assert_eq!(envelope.from.len(), 1);
        assert_eq!(envelope.from[0].email(), Some("a@x.org".to_string()));
        assert_eq!(envelope.in_reply_to.as_deref(), Some("irt"));
        assert_eq!(envelope.message_id.as_deref(), Some("mid"));
    }

    #[test]
    fn test_parse_text_body_structure() {
        let mut lexer = Lexer::new(
            b"(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92)",
        );
        let body = parse_body_structure(&mut lexer).unwrap();

        match body {
            BodyStructure::Text {
                subtype,
                size,
                lines,
                encoding,
                ..
            } => {
                assert_eq!(subtype, "PLAIN");
                assert_eq!(size, 3028);
                assert_eq!(lines, 92);
                assert_eq!(encoding, "7BIT");
            }
            other => panic!("Expected Text, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_multipart_body_structure() {
        let mut lexer = Lexer::new(
            b"((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)(\"IMAGE\" \"PNG\" NIL NIL NIL \"BASE64\" 4096) \"MIXED\")",
        );
        let body = parse_body_structure(&mut lexer).unwrap();

        match body {
            BodyStructure::Multipart { bodies, subtype } => {
                assert_eq!(subtype, "MIXED");
                assert_eq!(bodies.len(), 2);
                assert!(matches!(bodies[1], BodyStructure::Basic { .. }));
            }
            other => panic!("Expected Multipart, got {other:?}"),
        }
    }

    #[test]
    fn test_nil_media_type_rejected() {
        let mut lexer = Lexer::new(b"(NIL \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)");
        assert!(parse_body_structure(&mut lexer).is_err());
    }
}
