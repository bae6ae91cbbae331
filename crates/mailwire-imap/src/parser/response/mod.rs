//! IMAP response parser.
//!
//! Classifies and parses complete server responses (RFC 3501 grammar).
//! The input must contain any literal payloads inline; the framed reader
//! takes care of that before this parser runs.

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod helpers;
mod types;

pub use types::{
    Address, AclEntry, BodyStructure, Envelope, FetchItem, NamespaceEntry, QuotaResource,
    StatusItem, UntaggedResponse,
};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use helpers::{
    parse_acl_response, parse_capability_data, parse_list_response, parse_listrights_response,
    parse_myrights_response, parse_namespace_list, parse_quota_response,
    parse_quotaroot_response, parse_response_code, parse_search_response, parse_status_response,
    read_text_until_crlf,
};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text or challenge data.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Self::parse_continuation(&mut lexer),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    /// Parses a tagged response.
    fn parse_tagged(lexer: &mut Lexer<'_>, tag_str: &str) -> Result<Response> {
        lexer.expect_space()?;

        let status = Self::parse_status(lexer)?;
        lexer.expect_space()?;

        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag_str),
            status,
            code,
            text,
        })
    }

    /// Parses an untagged response.
    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let token = lexer.next_token()?;

        match token {
            Token::Atom(s) => {
                let upper = s.to_uppercase();
                match upper.as_str() {
                    "OK" => {
                        lexer.expect_space()?;
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Ok { code, text }))
                    }
                    "NO" => {
                        lexer.expect_space()?;
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::No { code, text }))
                    }
                    "BAD" => {
                        lexer.expect_space()?;
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Bad { code, text }))
                    }
                    "PREAUTH" => {
                        lexer.expect_space()?;
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::PreAuth { code, text }))
                    }
                    "BYE" => {
                        lexer.expect_space()?;
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Bye { code, text }))
                    }
                    "CAPABILITY" => {
                        let caps = parse_capability_data(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Capability(caps)))
                    }
                    "FLAGS" => {
                        lexer.expect_space()?;
                        let flags = helpers::parse_flag_list(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Flags(flags)))
                    }
                    "LIST" => {
                        lexer.expect_space()?;
                        let list = parse_list_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::List(list)))
                    }
                    "LSUB" => {
                        lexer.expect_space()?;
                        let list = parse_list_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Lsub(list)))
                    }
                    "SEARCH" => {
                        let nums = parse_search_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Search(nums)))
                    }
                    "STATUS" => {
                        lexer.expect_space()?;
                        let (mailbox, items) = parse_status_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Status {
                            mailbox,
                            items,
                        }))
                    }
                    "ACL" => {
                        lexer.expect_space()?;
                        let (mailbox, entries) = parse_acl_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Acl {
                            mailbox,
                            entries,
                        }))
                    }
                    "LISTRIGHTS" => {
                        lexer.expect_space()?;
                        let (mailbox, identifier, rights) = parse_listrights_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::ListRights {
                            mailbox,
                            identifier,
                            rights,
                        }))
                    }
                    "MYRIGHTS" => {
                        lexer.expect_space()?;
                        let (mailbox, rights) = parse_myrights_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::MyRights {
                            mailbox,
                            rights,
                        }))
                    }
                    "QUOTAROOT" => {
                        lexer.expect_space()?;
                        let (mailbox, roots) = parse_quotaroot_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::QuotaRoot {
                            mailbox,
                            roots,
                        }))
                    }
                    "QUOTA" => {
                        lexer.expect_space()?;
                        let (root, resources) = parse_quota_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Quota {
                            root,
                            resources,
                        }))
                    }
                    "NAMESPACE" => {
                        lexer.expect_space()?;
                        let personal = parse_namespace_list(lexer)?;
                        lexer.expect_space()?;
                        let other = parse_namespace_list(lexer)?;
                        lexer.expect_space()?;
                        let shared = parse_namespace_list(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Namespace {
                            personal,
                            other,
                            shared,
                        }))
                    }
                    _ => {
                        // Unmodeled server data stays available verbatim.
                        if lexer.peek() == Some(b' ') {
                            lexer.advance();
                        }
                        let text = read_text_until_crlf(lexer);
                        Ok(Response::Untagged(UntaggedResponse::Unknown {
                            keyword: upper,
                            text,
                        }))
                    }
                }
            }
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                let upper = keyword.to_uppercase();

                match upper.as_str() {
                    "EXISTS" => Ok(Response::Untagged(UntaggedResponse::Exists(n))),
                    "RECENT" => Ok(Response::Untagged(UntaggedResponse::Recent(n))),
                    "EXPUNGE" => {
                        let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "Invalid sequence number 0".to_string(),
                        })?;
                        Ok(Response::Untagged(UntaggedResponse::Expunge(seq)))
                    }
                    "FETCH" => {
                        let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "Invalid sequence number 0".to_string(),
                        })?;
                        lexer.expect_space()?;
                        let items = fetch::parse_fetch_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Fetch { seq, items }))
                    }
                    _ => Err(Error::Parse {
                        position: lexer.position(),
                        message: format!("Unknown message data: {keyword}"),
                    }),
                }
            }
            _ => Err(Error::Parse {
                position: lexer.position(),
                message: format!("Unexpected token in untagged response: {token:?}"),
            }),
        }
    }

    /// Parses a continuation response.
    fn parse_continuation(lexer: &mut Lexer<'_>) -> Result<Response> {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let text = read_text_until_crlf(lexer);

        Ok(Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        })
    }

    /// Parses a status keyword.
    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(Error::Parse {
                position: lexer.position(),
                message: format!("Invalid status: {s}"),
            }),
        }
    }

    /// Parses response text with optional response code.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let text = read_text_until_crlf(lexer);

        Ok((code, text))
    }
}

// Shared with the fetch module.
pub(crate) use helpers::parse_flag_list;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Capability, Flag, MailboxAttribute};

    #[test]
    fn test_parse_ok_greeting() {
        let response = ResponseParser::parse(b"* OK IMAP4rev1 server ready\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                assert!(code.is_none());
                assert_eq!(text, "IMAP4rev1 server ready");
            }
            other => panic!("Expected untagged OK, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged_ok() {
        let response = ResponseParser::parse(b"A0001 OK LOGIN completed\r\n").unwrap();
        match response {
            Response::Tagged {
                tag, status, text, ..
            } => {
                assert_eq!(tag.as_str(), "A0001");
                assert_eq!(status, Status::Ok);
                assert_eq!(text, "LOGIN completed");
            }
            other => panic!("Expected tagged response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged_no() {
        let response = ResponseParser::parse(b"A0002 NO [TRYCREATE] no such mailbox\r\n").unwrap();
        match response {
            Response::Tagged { status, code, .. } => {
                assert_eq!(status, Status::No);
                assert_eq!(code, Some(ResponseCode::TryCreate));
            }
            other => panic!("Expected tagged response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_capability() {
        let response =
            ResponseParser::parse(b"* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN AUTH=CRAM-MD5\r\n")
                .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Capability(caps)) => {
                assert!(caps.contains(&Capability::Imap4Rev1));
                assert!(caps.contains(&Capability::Idle));
                assert!(caps.contains(&Capability::Auth("PLAIN".to_string())));
                assert!(caps.contains(&Capability::Auth("CRAM-MD5".to_string())));
            }
            other => panic!("Expected capability, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_exists_and_expunge() {
        match ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap() {
            Response::Untagged(UntaggedResponse::Exists(n)) => assert_eq!(n, 23),
            other => panic!("Expected EXISTS, got {other:?}"),
        }
        match ResponseParser::parse(b"* 4 EXPUNGE\r\n").unwrap() {
            Response::Untagged(UntaggedResponse::Expunge(seq)) => assert_eq!(seq.get(), 4),
            other => panic!("Expected EXPUNGE, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_and_lsub() {
        let response =
            ResponseParser::parse(b"* LIST (\\HasChildren) \"/\" \"INBOX\"\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::List(list)) => {
                assert!(list.attributes.contains(&MailboxAttribute::HasChildren));
                assert_eq!(list.delimiter, Some('/'));
                assert_eq!(list.mailbox.as_str(), "INBOX");
            }
            other => panic!("Expected LIST, got {other:?}"),
        }

        let response = ResponseParser::parse(b"* LSUB () \"/\" \"Sent\"\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Lsub(_))
        ));
    }

    #[test]
    fn test_parse_list_utf7_mailbox() {
        let response =
            ResponseParser::parse(b"* LIST () \"/\" \"Entw&APw-rfe\"\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::List(list)) => {
                assert_eq!(list.mailbox.as_str(), "Entw\u{fc}rfe");
            }
            other => panic!("Expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_continuation() {
        let response = ResponseParser::parse(b"+ Ready for literal\r\n").unwrap();
        match response {
            Response::Continuation { text } => {
                assert_eq!(text.as_deref(), Some("Ready for literal"));
            }
            other => panic!("Expected continuation, got {other:?}"),
        }

        // Bare "+" with no text is a server quirk, still a continuation.
        let response = ResponseParser::parse(b"+\r\n").unwrap();
        assert!(matches!(response, Response::Continuation { text: None }));
    }

    #[test]
    fn test_parse_permanentflags_code() {
        let response = ResponseParser::parse(
            b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n",
        )
        .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::PermanentFlags(flags)),
                ..
            }) => {
                assert!(flags.contains(&Flag::Deleted));
                assert!(flags.contains(&Flag::Seen));
            }
            other => panic!("Expected PERMANENTFLAGS, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_uidvalidity_code() {
        let response =
            ResponseParser::parse(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::UidValidity(v)),
                text,
            }) => {
                assert_eq!(v.get(), 3_857_529_045);
                assert_eq!(text, "UIDs valid");
            }
            other => panic!("Expected UIDVALIDITY, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_search() {
        let response = ResponseParser::parse(b"* SEARCH 2 3 5 8 13\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Search(nums)) => {
                let values: Vec<u32> = nums.iter().map(|s| s.get()).collect();
                assert_eq!(values, vec![2, 3, 5, 8, 13]);
            }
            other => panic!("Expected SEARCH, got {other:?}"),
        }

        let response = ResponseParser::parse(b"* SEARCH\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Search(nums)) if nums.is_empty()
        ));
    }

    #[test]
    fn test_parse_status() {
        let response = ResponseParser::parse(
            b"* STATUS \"INBOX\" (MESSAGES 231 UIDNEXT 44292 UNSEEN 3)\r\n",
        )
        .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Status { mailbox, items }) => {
                assert_eq!(mailbox.as_str(), "INBOX");
                assert!(items.contains(&StatusItem::Messages(231)));
                assert!(items.contains(&StatusItem::Unseen(3)));
            }
            other => panic!("Expected STATUS, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_acl() {
        let response =
            ResponseParser::parse(b"* ACL INBOX steve lrswipcda anyone lrs\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Acl { mailbox, entries }) => {
                assert_eq!(mailbox.as_str(), "INBOX");
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].identifier, "steve");
                assert_eq!(entries[0].rights, "lrswipcda");
                assert_eq!(entries[1].identifier, "anyone");
            }
            other => panic!("Expected ACL, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_myrights() {
        let response = ResponseParser::parse(b"* MYRIGHTS INBOX lrswipcda\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::MyRights { mailbox, rights }) => {
                assert_eq!(mailbox.as_str(), "INBOX");
                assert_eq!(rights, "lrswipcda");
            }
            other => panic!("Expected MYRIGHTS, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_quota() {
        let response =
            ResponseParser::parse(b"* QUOTA \"\" (STORAGE 10 512)\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Quota { root, resources }) => {
                assert_eq!(root, "");
                assert_eq!(resources.len(), 1);
                assert_eq!(resources[0].name, "STORAGE");
                assert_eq!(resources[0].usage, 10);
                assert_eq!(resources[0].limit, 512);
            }
            other => panic!("Expected QUOTA, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_quotaroot() {
        let response = ResponseParser::parse(b"* QUOTAROOT INBOX \"\"\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::QuotaRoot { mailbox, roots }) => {
                assert_eq!(mailbox.as_str(), "INBOX");
                assert_eq!(roots, vec![String::new()]);
            }
            other => panic!("Expected QUOTAROOT, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_namespace() {
        let response = ResponseParser::parse(
            b"* NAMESPACE ((\"\" \"/\")) NIL ((\"Public/\" \"/\"))\r\n",
        )
        .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Namespace {
                personal,
                other,
                shared,
            }) => {
                assert_eq!(personal.len(), 1);
                assert_eq!(personal[0].prefix, "");
                assert_eq!(personal[0].delimiter, Some('/'));
                assert!(other.is_empty());
                assert_eq!(shared[0].prefix, "Public/");
            }
            other => panic!("Expected NAMESPACE, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fetch_with_literal() {
        let response = ResponseParser::parse(
            b"* 1 FETCH (BODY[HEADER] {23}\r\nSubject: hi\r\nDate: x\r\n\r\n)\r\n",
        )
        .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                assert_eq!(seq.get(), 1);
                assert_eq!(items.len(), 1);
                match &items[0] {
                    FetchItem::Body { section, data, .. } => {
                        assert_eq!(section.as_deref(), Some("HEADER"));
                        assert_eq!(
                            data.as_deref(),
                            Some(b"Subject: hi\r\nDate: x\r\n\r\n".as_slice())
                        );
                    }
                    other => panic!("Expected Body, got {other:?}"),
                }
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_untagged_kept() {
        let response = ResponseParser::parse(b"* XAPPLEPUSH ready\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Unknown { keyword, text }) => {
                assert_eq!(keyword, "XAPPLEPUSH");
                assert_eq!(text, "ready");
            }
            other => panic!("Expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bye() {
        let response = ResponseParser::parse(b"* BYE Autologout; idle too long\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Bye { .. })
        ));
    }
}
