//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, ResponseCode, SeqNum, Uid,
    UidValidity,
};
use crate::{Error, Result};

use super::types::{AclEntry, NamespaceEntry, QuotaResource, StatusItem};

/// Parses a bracketed response code.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let upper = atom.to_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid UID 0".to_string(),
            })?;
            ResponseCode::UidNext(uid)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let validity = UidValidity::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid UIDVALIDITY 0".to_string(),
            })?;
            ResponseCode::UidValidity(validity)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid sequence number 0".to_string(),
            })?;
            ResponseCode::Unseen(seq)
        }
        "CAPABILITY" => {
            let caps = parse_capability_data(lexer)?;
            ResponseCode::Capability(caps)
        }
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            let flags = parse_flag_list(lexer)?;
            ResponseCode::PermanentFlags(flags.into_iter().collect())
        }
        _ => {
            // Keep the argument text verbatim for codes we don't model.
            let mut args = String::new();
            while let Some(b) = lexer.peek() {
                if b == b']' {
                    break;
                }
                args.push(b as char);
                lexer.advance();
            }
            ResponseCode::Unknown(upper, args.trim().to_string())
        }
    };

    // Tolerate trailing arguments on modeled codes.
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

/// Parses space-separated capability atoms.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in flag list: {token:?}"),
                });
            }
        }
    }

    Ok(flags)
}

/// Reads a mailbox name and decodes its modified UTF-7 form.
pub fn read_mailbox(lexer: &mut Lexer<'_>) -> Result<Mailbox> {
    let raw = lexer.read_astring()?;
    Mailbox::from_wire(&raw)
}

/// Parses a LIST or LSUB response body.
pub fn parse_list_response(lexer: &mut Lexer<'_>) -> Result<ListResponse> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(MailboxAttribute::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in LIST attributes: {token:?}"),
                });
            }
        }
    }

    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("Expected delimiter, got {token:?}"),
            });
        }
    };

    lexer.expect_space()?;
    let mailbox = read_mailbox(lexer)?;

    Ok(ListResponse {
        attributes,
        delimiter,
        mailbox,
    })
}

/// Parses a SEARCH response body.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<SeqNum>> {
    let mut nums = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Number(n) = lexer.next_token()?
            && let Some(seq) = SeqNum::new(n)
        {
            nums.push(seq);
        }
    }

    Ok(nums)
}

/// Parses a STATUS response body.
pub fn parse_status_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, Vec<StatusItem>)> {
    let mailbox = read_mailbox(lexer)?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                lexer.expect_space()?;
                let value = lexer.read_number()?;

                let item = match name.to_uppercase().as_str() {
                    "MESSAGES" => StatusItem::Messages(value),
                    "RECENT" => StatusItem::Recent(value),
                    "UIDNEXT" => {
                        if let Some(uid) = Uid::new(value) {
                            StatusItem::UidNext(uid)
                        } else {
                            continue;
                        }
                    }
                    "UIDVALIDITY" => {
                        if let Some(v) = UidValidity::new(value) {
                            StatusItem::UidValidity(v)
                        } else {
                            continue;
                        }
                    }
                    "UNSEEN" => StatusItem::Unseen(value),
                    _ => continue,
                };
                items.push(item);
            }
            _ => continue,
        }
    }

    Ok((mailbox, items))
}

/// Parses an ACL response body: mailbox, then identifier/rights pairs.
pub fn parse_acl_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, Vec<AclEntry>)> {
    let mailbox = read_mailbox(lexer)?;

    let mut entries = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        let identifier = lexer.read_astring()?;
        lexer.expect_space()?;
        let rights = lexer.read_astring()?;
        entries.push(AclEntry { identifier, rights });
    }

    Ok((mailbox, entries))
}

/// Parses a LISTRIGHTS response body.
pub fn parse_listrights_response(
    lexer: &mut Lexer<'_>,
) -> Result<(Mailbox, String, Vec<String>)> {
    let mailbox = read_mailbox(lexer)?;
    lexer.expect_space()?;
    let identifier = lexer.read_astring()?;

    let mut rights = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        rights.push(lexer.read_astring()?);
    }

    Ok((mailbox, identifier, rights))
}

/// Parses a MYRIGHTS response body.
pub fn parse_myrights_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, String)> {
    let mailbox = read_mailbox(lexer)?;
    lexer.expect_space()?;
    let rights = lexer.read_astring()?;
    Ok((mailbox, rights))
}

/// Parses a QUOTAROOT response body: mailbox, then root names.
pub fn parse_quotaroot_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, Vec<String>)> {
    let mailbox = read_mailbox(lexer)?;

    let mut roots = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        roots.push(lexer.read_astring()?);
    }

    Ok((mailbox, roots))
}

/// Parses a QUOTA response body: root, then (name usage limit ...) triples.
pub fn parse_quota_response(lexer: &mut Lexer<'_>) -> Result<(String, Vec<QuotaResource>)> {
    let root = lexer.read_astring()?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut resources = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                lexer.expect_space()?;
                let usage = lexer.read_number()?;
                lexer.expect_space()?;
                let limit = lexer.read_number()?;
                resources.push(QuotaResource {
                    name: name.to_uppercase(),
                    usage,
                    limit,
                });
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in QUOTA: {token:?}"),
                });
            }
        }
    }

    Ok((root, resources))
}

/// Parses one namespace list: NIL or ((prefix delimiter) ...).
pub fn parse_namespace_list(lexer: &mut Lexer<'_>) -> Result<Vec<NamespaceEntry>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut entries = Vec::new();
            loop {
                match lexer.next_token()? {
                    Token::RParen => break,
                    Token::Space => continue,
                    Token::LParen => {
                        let prefix = lexer.read_astring()?;
                        lexer.expect_space()?;
                        let delimiter = match lexer.next_token()? {
                            Token::Nil => None,
                            Token::QuotedString(s) => s.chars().next(),
                            token => {
                                return Err(Error::Parse {
                                    position: lexer.position(),
                                    message: format!("Expected delimiter, got {token:?}"),
                                });
                            }
                        };
                        // Skip namespace extensions up to the entry's close.
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
                                Some(_) => {
                                    lexer.advance();
                                }
                                None => break,
                            }
                        }
                        entries.push(NamespaceEntry { prefix, delimiter });
                    }
                    token => {
                        return Err(Error::Parse {
                            position: lexer.position(),
                            message: format!("Unexpected token in NAMESPACE: {token:?}"),
                        });
                    }
                }
            }
            Ok(entries)
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("Expected namespace list, got {token:?}"),
        }),
    }
}

/// Reads text until CRLF (or end of input).
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();

    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end);
    if lexer.peek() == Some(b'\r') {
        lexer.skip(2);
    }

    String::from_utf8_lossy(&remaining[..end]).to_string()
}
