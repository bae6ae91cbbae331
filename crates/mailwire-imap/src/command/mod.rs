//! IMAP command builders.
//!
//! A [`Command`] serializes into [`CommandPart`]s: text runs and literal
//! payloads. The engine writes text up to each literal's `{n}` prefix,
//! waits for the server continuation, then sends the payload. Arguments
//! containing non-ASCII bytes, CTL characters, or quotes go as literals;
//! everything else is an atom or a quoted string.

mod tag_generator;

pub use tag_generator::TagGenerator;

use crate::types::{Flags, Mailbox, SequenceSet};

/// One piece of a serialized command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPart {
    /// Plain command text (no framing).
    Text(Vec<u8>),
    /// A literal payload; the engine awaits a continuation before sending.
    Literal(Vec<u8>),
}

/// STATUS data item requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusQuery {
    /// Message count.
    Messages,
    /// Recent count.
    Recent,
    /// Predicted next UID.
    UidNext,
    /// UIDVALIDITY value.
    UidValidity,
    /// Unseen count.
    Unseen,
}

impl StatusQuery {
    /// Wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// FETCH item selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// The ALL macro.
    All,
    /// The FULL macro.
    Full,
    /// The FAST macro.
    Fast,
    /// An explicit attribute list.
    Items(Vec<FetchAttribute>),
}

/// A single FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// FLAGS.
    Flags,
    /// INTERNALDATE.
    InternalDate,
    /// RFC822.SIZE.
    Rfc822Size,
    /// RFC822.HEADER.
    Rfc822Header,
    /// RFC822.TEXT.
    Rfc822Text,
    /// ENVELOPE.
    Envelope,
    /// BODYSTRUCTURE.
    BodyStructure,
    /// UID.
    Uid,
    /// BODY[section]<partial>, optionally with PEEK (does not set \Seen).
    Body {
        /// Section specifier, `None` for the whole message.
        section: Option<String>,
        /// Use BODY.PEEK.
        peek: bool,
        /// Partial fetch `<offset.length>`.
        partial: Option<(u32, u32)>,
    },
}

/// STORE action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// FLAGS: replace the flag set.
    SetFlags(Flags),
    /// +FLAGS: add flags.
    AddFlags(Flags),
    /// -FLAGS: remove flags.
    RemoveFlags(Flags),
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// ALL messages.
    All,
    /// Messages with \Answered.
    Answered,
    /// Messages with \Deleted.
    Deleted,
    /// Messages with \Draft.
    Draft,
    /// Messages with \Flagged.
    Flagged,
    /// New messages (recent and unseen).
    New,
    /// Messages without \Deleted.
    Undeleted,
    /// Messages without \Seen.
    Unseen,
    /// Messages with \Seen.
    Seen,
    /// An explicit sequence set.
    SequenceSet(SequenceSet),
    /// SUBJECT contains.
    Subject(String),
    /// FROM contains.
    From(String),
    /// TO contains.
    To(String),
    /// BODY contains.
    Body(String),
    /// TEXT contains.
    Text(String),
    /// Arbitrary header contains.
    Header(String, String),
    /// Internal date on or after.
    Since(String),
    /// Internal date before.
    Before(String),
    /// Internal date on.
    On(String),
    /// Size larger than.
    Larger(u32),
    /// Size smaller than.
    Smaller(u32),
    /// Conjunction.
    And(Vec<SearchCriteria>),
    /// Disjunction.
    Or(Box<SearchCriteria>, Box<SearchCriteria>),
    /// Negation.
    Not(Box<SearchCriteria>),
}

/// An IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY.
    Capability,
    /// NOOP.
    Noop,
    /// LOGOUT.
    Logout,
    /// STARTTLS.
    StartTls,
    /// LOGIN user password.
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT mailbox.
    Select(Mailbox),
    /// EXAMINE mailbox.
    Examine(Mailbox),
    /// CLOSE.
    Close,
    /// LIST reference pattern.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// LSUB reference pattern.
    Lsub {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// STATUS mailbox (items).
    Status {
        /// Mailbox to query.
        mailbox: Mailbox,
        /// Items to request.
        items: Vec<StatusQuery>,
    },
    /// FETCH / UID FETCH.
    Fetch {
        /// Messages to fetch.
        set: SequenceSet,
        /// Items to fetch.
        items: FetchItems,
        /// Interpret the set as UIDs.
        uid: bool,
    },
    /// SEARCH / UID SEARCH.
    Search {
        /// Search criteria.
        criteria: SearchCriteria,
        /// Return UIDs instead of sequence numbers.
        uid: bool,
    },
    /// STORE / UID STORE.
    Store {
        /// Messages to update.
        set: SequenceSet,
        /// Flag action.
        action: StoreAction,
        /// Suppress the untagged FETCH echoes.
        silent: bool,
        /// Interpret the set as UIDs.
        uid: bool,
    },
    /// COPY / UID COPY.
    Copy {
        /// Messages to copy.
        set: SequenceSet,
        /// Destination mailbox.
        mailbox: Mailbox,
        /// Interpret the set as UIDs.
        uid: bool,
    },
    /// APPEND mailbox [flags] message-literal.
    Append {
        /// Destination mailbox.
        mailbox: Mailbox,
        /// Initial flags.
        flags: Option<Flags>,
        /// RFC 5322 message bytes.
        message: Vec<u8>,
    },
    /// EXPUNGE.
    Expunge,
    /// IDLE (RFC 2177).
    Idle,
    /// NAMESPACE (RFC 2342).
    Namespace,
    /// GETQUOTA root.
    GetQuota(String),
    /// GETQUOTAROOT mailbox.
    GetQuotaRoot(Mailbox),
    /// GETACL mailbox.
    GetAcl(Mailbox),
    /// LISTRIGHTS mailbox identifier.
    ListRights {
        /// Mailbox to query.
        mailbox: Mailbox,
        /// Authorization identifier.
        identifier: String,
    },
    /// MYRIGHTS mailbox.
    MyRights(Mailbox),
}

impl Command {
    /// Serializes the tagged command into parts. The final text part ends
    /// with CRLF.
    #[must_use]
    pub fn parts(&self, tag: &str) -> Vec<CommandPart> {
        let mut w = CommandWriter::new(tag);

        match self {
            Self::Capability => w.text("CAPABILITY"),
            Self::Noop => w.text("NOOP"),
            Self::Logout => w.text("LOGOUT"),
            Self::StartTls => w.text("STARTTLS"),
            Self::Login { username, password } => {
                w.text("LOGIN ");
                w.astring(username);
                w.text(" ");
                w.astring(password);
            }
            Self::Select(mailbox) => {
                w.text("SELECT ");
                w.mailbox(mailbox);
            }
            Self::Examine(mailbox) => {
                w.text("EXAMINE ");
                w.mailbox(mailbox);
            }
            Self::Close => w.text("CLOSE"),
            Self::List { reference, pattern } => {
                w.text("LIST ");
                w.astring(reference);
                w.text(" ");
                w.list_pattern(pattern);
            }
            Self::Lsub { reference, pattern } => {
                w.text("LSUB ");
                w.astring(reference);
                w.text(" ");
                w.list_pattern(pattern);
            }
            Self::Status { mailbox, items } => {
                w.text("STATUS ");
                w.mailbox(mailbox);
                let names: Vec<&str> = items.iter().map(|i| i.as_str()).collect();
                w.text(&format!(" ({})", names.join(" ")));
            }
            Self::Fetch { set, items, uid } => {
                if *uid {
                    w.text("UID ");
                }
                w.text(&format!("FETCH {set} "));
                write_fetch_items(&mut w, items);
            }
            Self::Search { criteria, uid } => {
                if *uid {
                    w.text("UID ");
                }
                w.text("SEARCH ");
                write_search_criteria(&mut w, criteria);
            }
            Self::Store {
                set,
                action,
                silent,
                uid,
            } => {
                if *uid {
                    w.text("UID ");
                }
                w.text(&format!("STORE {set} "));
                let keyword = match action {
                    StoreAction::SetFlags(_) => "FLAGS",
                    StoreAction::AddFlags(_) => "+FLAGS",
                    StoreAction::RemoveFlags(_) => "-FLAGS",
                };
                let flags = match action {
                    StoreAction::SetFlags(f)
                    | StoreAction::AddFlags(f)
                    | StoreAction::RemoveFlags(f) => f,
                };
                w.text(keyword);
                if *silent {
                    w.text(".SILENT");
                }
                w.text(&format!(" {}", flags.to_wire()));
            }
            Self::Copy { set, mailbox, uid } => {
                if *uid {
                    w.text("UID ");
                }
                w.text(&format!("COPY {set} "));
                w.mailbox(mailbox);
            }
            Self::Append {
                mailbox,
                flags,
                message,
            } => {
                w.text("APPEND ");
                w.mailbox(mailbox);
                if let Some(flags) = flags {
                    w.text(&format!(" {}", flags.to_wire()));
                }
                w.text(" ");
                w.literal(message.clone());
            }
            Self::Expunge => w.text("EXPUNGE"),
            Self::Idle => w.text("IDLE"),
            Self::Namespace => w.text("NAMESPACE"),
            Self::GetQuota(root) => {
                w.text("GETQUOTA ");
                w.astring(root);
            }
            Self::GetQuotaRoot(mailbox) => {
                w.text("GETQUOTAROOT ");
                w.mailbox(mailbox);
            }
            Self::GetAcl(mailbox) => {
                w.text("GETACL ");
                w.mailbox(mailbox);
            }
            Self::ListRights {
                mailbox,
                identifier,
            } => {
                w.text("LISTRIGHTS ");
                w.mailbox(mailbox);
                w.text(" ");
                w.astring(identifier);
            }
            Self::MyRights(mailbox) => {
                w.text("MYRIGHTS ");
                w.mailbox(mailbox);
            }
        }

        w.finish()
    }
}

/// Accumulates command text, splitting at literal boundaries.
struct CommandWriter {
    parts: Vec<CommandPart>,
    current: Vec<u8>,
}

impl CommandWriter {
    fn new(tag: &str) -> Self {
        let mut current = Vec::with_capacity(64);
        current.extend_from_slice(tag.as_bytes());
        current.push(b' ');
        Self {
            parts: Vec::new(),
            current,
        }
    }

    fn text(&mut self, s: &str) {
        self.current.extend_from_slice(s.as_bytes());
    }

    /// Writes an astring: atom, quoted string, or literal.
    fn astring(&mut self, s: &str) {
        if needs_literal(s) {
            self.literal(s.as_bytes().to_vec());
        } else if s.is_empty() || s.bytes().any(needs_quoting) {
            self.current.push(b'"');
            for b in s.bytes() {
                if b == b'"' || b == b'\\' {
                    self.current.push(b'\\');
                }
                self.current.push(b);
            }
            self.current.push(b'"');
        } else {
            self.current.extend_from_slice(s.as_bytes());
        }
    }

    /// Writes a mailbox name in its wire (modified UTF-7) form.
    fn mailbox(&mut self, mailbox: &Mailbox) {
        self.astring(&mailbox.to_wire());
    }

    /// Writes a LIST pattern; wildcards must stay unquoted-safe.
    fn list_pattern(&mut self, pattern: &str) {
        if pattern.is_empty() {
            self.text("\"\"");
        } else if pattern
            .bytes()
            .all(|b| crate::parser::lexer::is_atom_char(b) || b == b'*' || b == b'%')
        {
            self.text(pattern);
        } else {
            self.astring(pattern);
        }
    }

    /// Queues a literal: `{n}` goes on the current text part, the payload
    /// becomes its own part.
    fn literal(&mut self, data: Vec<u8>) {
        self.current
            .extend_from_slice(format!("{{{}}}\r\n", data.len()).as_bytes());
        self.parts
            .push(CommandPart::Text(std::mem::take(&mut self.current)));
        self.parts.push(CommandPart::Literal(data));
    }

    fn finish(mut self) -> Vec<CommandPart> {
        self.current.extend_from_slice(b"\r\n");
        self.parts.push(CommandPart::Text(self.current));
        self.parts
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

/// Arguments with non-ASCII bytes, CTL characters, or quotes are sent as
/// literals.
fn needs_literal(s: &str) -> bool {
    s.bytes()
        .any(|b| b >= 0x80 || b < 0x20 || b == 0x7F || b == b'"')
}

fn write_fetch_items(w: &mut CommandWriter, items: &FetchItems) {
    match items {
        FetchItems::All => w.text("ALL"),
        FetchItems::Full => w.text("FULL"),
        FetchItems::Fast => w.text("FAST"),
        FetchItems::Items(attrs) => {
            if attrs.len() == 1 {
                write_fetch_attribute(w, &attrs[0]);
            } else {
                w.text("(");
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        w.text(" ");
                    }
                    write_fetch_attribute(w, attr);
                }
                w.text(")");
            }
        }
    }
}

fn write_fetch_attribute(w: &mut CommandWriter, attr: &FetchAttribute) {
    match attr {
        FetchAttribute::Flags => w.text("FLAGS"),
        FetchAttribute::InternalDate => w.text("INTERNALDATE"),
        FetchAttribute::Rfc822Size => w.text("RFC822.SIZE"),
        FetchAttribute::Rfc822Header => w.text("RFC822.HEADER"),
        FetchAttribute::Rfc822Text => w.text("RFC822.TEXT"),
        FetchAttribute::Envelope => w.text("ENVELOPE"),
        FetchAttribute::BodyStructure => w.text("BODYSTRUCTURE"),
        FetchAttribute::Uid => w.text("UID"),
        FetchAttribute::Body {
            section,
            peek,
            partial,
        } => {
            w.text(if *peek { "BODY.PEEK[" } else { "BODY[" });
            if let Some(s) = section {
                w.text(s);
            }
            w.text("]");
            if let Some((start, len)) = partial {
                w.text(&format!("<{start}.{len}>"));
            }
        }
    }
}

fn write_search_criteria(w: &mut CommandWriter, criteria: &SearchCriteria) {
    match criteria {
        SearchCriteria::All => w.text("ALL"),
        SearchCriteria::Answered => w.text("ANSWERED"),
        SearchCriteria::Deleted => w.text("DELETED"),
        SearchCriteria::Draft => w.text("DRAFT"),
        SearchCriteria::Flagged => w.text("FLAGGED"),
        SearchCriteria::New => w.text("NEW"),
        SearchCriteria::Undeleted => w.text("UNDELETED"),
        SearchCriteria::Unseen => w.text("UNSEEN"),
        SearchCriteria::Seen => w.text("SEEN"),
        SearchCriteria::SequenceSet(set) => w.text(&set.to_string()),
        SearchCriteria::Subject(s) => {
            w.text("SUBJECT ");
            w.astring(s);
        }
        SearchCriteria::From(s) => {
            w.text("FROM ");
            w.astring(s);
        }
        SearchCriteria::To(s) => {
            w.text("TO ");
            w.astring(s);
        }
        SearchCriteria::Body(s) => {
            w.text("BODY ");
            w.astring(s);
        }
        SearchCriteria::Text(s) => {
            w.text("TEXT ");
            w.astring(s);
        }
        SearchCriteria::Header(name, value) => {
            w.text("HEADER ");
            w.astring(name);
            w.text(" ");
            w.astring(value);
        }
        SearchCriteria::Since(date) => w.text(&format!("SINCE {date}")),
        SearchCriteria::Before(date) => w.text(&format!("BEFORE {date}")),
        SearchCriteria::On(date) => w.text(&format!("ON {date}")),
        SearchCriteria::Larger(size) => w.text(&format!("LARGER {size}")),
        SearchCriteria::Smaller(size) => w.text(&format!("SMALLER {size}")),
        SearchCriteria::And(criteria) => {
            for (i, c) in criteria.iter().enumerate() {
                if i > 0 {
                    w.text(" ");
                }
                write_search_criteria(w, c);
            }
        }
        SearchCriteria::Or(a, b) => {
            w.text("OR ");
            write_search_criteria(w, a);
            w.text(" ");
            write_search_criteria(w, b);
        }
        SearchCriteria::Not(c) => {
            w.text("NOT ");
            write_search_criteria(w, c);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Flag;

    fn single_text(parts: &[CommandPart]) -> Vec<u8> {
        assert_eq!(parts.len(), 1, "expected one part, got {parts:?}");
        match &parts[0] {
            CommandPart::Text(t) => t.clone(),
            CommandPart::Literal(_) => panic!("expected text part"),
        }
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            single_text(&Command::Capability.parts("A0001")),
            b"A0001 CAPABILITY\r\n"
        );
        assert_eq!(single_text(&Command::Noop.parts("A0002")), b"A0002 NOOP\r\n");
        assert_eq!(
            single_text(&Command::Expunge.parts("A0003")),
            b"A0003 EXPUNGE\r\n"
        );
    }

    #[test]
    fn test_login_plain_args() {
        let cmd = Command::Login {
            username: "joe".to_string(),
            password: "sesame".to_string(),
        };
        assert_eq!(
            single_text(&cmd.parts("A0001")),
            b"A0001 LOGIN joe sesame\r\n"
        );
    }

    #[test]
    fn test_login_quoted_args() {
        let cmd = Command::Login {
            username: "joe user".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(
            single_text(&cmd.parts("A0001")),
            b"A0001 LOGIN \"joe user\" \"pass word\"\r\n"
        );
    }

    #[test]
    fn test_login_literal_password() {
        // Non-ASCII forces a literal with a continuation wait.
        let cmd = Command::Login {
            username: "joe".to_string(),
            password: "p\u{e4}ss".to_string(),
        };
        let parts = cmd.parts("A0001");
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0],
            CommandPart::Text(b"A0001 LOGIN joe {5}\r\n".to_vec())
        );
        assert_eq!(
            parts[1],
            CommandPart::Literal("p\u{e4}ss".as_bytes().to_vec())
        );
        assert_eq!(parts[2], CommandPart::Text(b"\r\n".to_vec()));
    }

    #[test]
    fn test_select_utf7_mailbox() {
        let cmd = Command::Select(Mailbox::new("Entw\u{fc}rfe"));
        assert_eq!(
            single_text(&cmd.parts("A0005")),
            b"A0005 SELECT Entw&APw-rfe\r\n"
        );
    }

    #[test]
    fn test_list_wildcards_unquoted() {
        let cmd = Command::List {
            reference: String::new(),
            pattern: "*".to_string(),
        };
        assert_eq!(single_text(&cmd.parts("A0001")), b"A0001 LIST \"\" *\r\n");
    }

    #[test]
    fn test_fetch_items() {
        let cmd = Command::Fetch {
            set: SequenceSet::range(1, 10).unwrap(),
            items: FetchItems::Items(vec![
                FetchAttribute::Flags,
                FetchAttribute::Uid,
                FetchAttribute::Envelope,
            ]),
            uid: false,
        };
        assert_eq!(
            single_text(&cmd.parts("A0001")),
            b"A0001 FETCH 1:10 (FLAGS UID ENVELOPE)\r\n"
        );
    }

    #[test]
    fn test_uid_fetch_peek_partial() {
        let cmd = Command::Fetch {
            set: SequenceSet::single(7).unwrap(),
            items: FetchItems::Items(vec![FetchAttribute::Body {
                section: Some("HEADER".to_string()),
                peek: true,
                partial: Some((0, 1024)),
            }]),
            uid: true,
        };
        assert_eq!(
            single_text(&cmd.parts("A0009")),
            b"A0009 UID FETCH 7 BODY.PEEK[HEADER]<0.1024>\r\n"
        );
    }

    #[test]
    fn test_store_silent() {
        let cmd = Command::Store {
            set: SequenceSet::single(3).unwrap(),
            action: StoreAction::AddFlags(Flags::from_vec(vec![Flag::Deleted])),
            silent: true,
            uid: false,
        };
        assert_eq!(
            single_text(&cmd.parts("A0004")),
            b"A0004 STORE 3 +FLAGS.SILENT (\\Deleted)\r\n"
        );
    }

    #[test]
    fn test_search_criteria() {
        let cmd = Command::Search {
            criteria: SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::From("boss@example.com".to_string()),
            ]),
            uid: false,
        };
        assert_eq!(
            single_text(&cmd.parts("A0001")),
            b"A0001 SEARCH UNSEEN FROM boss@example.com\r\n"
        );
    }

    #[test]
    fn test_append_literal() {
        let cmd = Command::Append {
            mailbox: Mailbox::new("Drafts"),
            flags: Some(Flags::from_vec(vec![Flag::Draft])),
            message: b"Subject: x\r\n\r\nbody\r\n".to_vec(),
        };
        let parts = cmd.parts("A0010");
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0],
            CommandPart::Text(b"A0010 APPEND Drafts (\\Draft) {20}\r\n".to_vec())
        );
        assert!(matches!(&parts[1], CommandPart::Literal(m) if m.len() == 20));
        assert_eq!(parts[2], CommandPart::Text(b"\r\n".to_vec()));
    }

    #[test]
    fn test_status_query() {
        let cmd = Command::Status {
            mailbox: Mailbox::new("INBOX"),
            items: vec![StatusQuery::Messages, StatusQuery::Unseen],
        };
        assert_eq!(
            single_text(&cmd.parts("A0002")),
            b"A0002 STATUS INBOX (MESSAGES UNSEEN)\r\n"
        );
    }
}
