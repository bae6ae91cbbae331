//! The per-connection IMAP command engine.
//!
//! One [`ImapConnection`] owns one socket. Commands are strictly
//! serialized: a tag is issued, the command (and any literal payloads,
//! each after a server continuation) is written, and responses are read
//! until the tagged completion arrives. Untagged responses seen along the
//! way are dispatched to registered handlers in arrival order; whatever
//! they do not consume is attached to the returned [`CommandOutcome`].

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use mailwire_net::stream::TlsSettings;
use mailwire_net::{MailStream, ProtocolConfig};

use crate::command::{Command, CommandPart, StatusQuery};
use crate::connection::FramedStream;
use crate::handler::{HandlerRegistry, UnsolicitedHandler};
use crate::parser::{FetchItem, Response, ResponseParser, StatusItem, UntaggedResponse};
use crate::types::{
    Capability, Flag, Flags, ListResponse, Mailbox, ResponseCode, SeqNum, SequenceSet, Status,
    Tag, Uid, UidValidity,
};
use crate::{Error, Result};

/// Result of one tagged command.
#[derive(Debug)]
pub struct CommandOutcome {
    /// The command tag.
    pub tag: Tag,
    /// Completion status.
    pub status: Status,
    /// Optional response code on the completion.
    pub code: Option<ResponseCode>,
    /// Human-readable completion text.
    pub text: String,
    /// Untagged responses received before the completion that no handler
    /// consumed, in arrival order.
    pub unsolicited: Vec<UntaggedResponse>,
    /// Raw bytes of the tagged completion, for diagnostics.
    pub raw: Vec<u8>,
}

impl CommandOutcome {
    /// Maps NO/BAD/BYE completions to errors.
    pub fn check(self) -> Result<Self> {
        match self.status {
            Status::Ok => Ok(self),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::Bye | Status::PreAuth => Err(Error::Protocol(format!(
                "unexpected {} completion",
                self.status
            ))),
        }
    }
}

/// Mailbox state assembled from a SELECT or EXAMINE exchange.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// EXISTS count.
    pub exists: u32,
    /// RECENT count.
    pub recent: u32,
    /// First unseen message, when reported.
    pub unseen: Option<SeqNum>,
    /// Predicted next UID.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Applicable flags.
    pub flags: Flags,
    /// Permanently settable flags.
    pub permanent_flags: Vec<Flag>,
    /// True when the mailbox is open read-only.
    pub read_only: bool,
}

/// A single IMAP connection and its protocol state.
pub struct ImapConnection {
    framed: FramedStream<MailStream>,
    tags: crate::command::TagGenerator,
    handlers: HandlerRegistry,
    capabilities: Vec<Capability>,
    host: String,
    tls: TlsSettings,
    timeout: Option<Duration>,
    tls_active: bool,
    open: bool,
    closed_by_server: bool,
    authenticated: bool,
    selected: Option<(Mailbox, bool)>,
    idle_tag: Option<Tag>,
}

impl ImapConnection {
    /// Opens a connection per the configuration and consumes the server
    /// greeting. Performs the STARTTLS upgrade when configured.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be opened, the greeting is
    /// BYE, or a required STARTTLS upgrade is unavailable.
    pub async fn connect(config: &ProtocolConfig) -> Result<Self> {
        Self::connect_with(config, None).await
    }

    /// Like [`Self::connect`], but through a caller-supplied stream
    /// factory.
    pub async fn connect_with(
        config: &ProtocolConfig,
        factory: Option<&std::sync::Arc<dyn mailwire_net::StreamFactory>>,
    ) -> Result<Self> {
        let stream = mailwire_net::connect(config, factory).await?;
        let timeout = config.read_timeout();
        let tls_active = stream.is_tls();

        let mut framed = FramedStream::new(stream);
        framed.set_timeout(timeout);

        let mut conn = Self {
            framed,
            tags: crate::command::TagGenerator::default(),
            handlers: HandlerRegistry::new(),
            capabilities: Vec::new(),
            host: config.host().to_string(),
            tls: TlsSettings::from_config(config),
            timeout,
            tls_active,
            open: true,
            closed_by_server: false,
            authenticated: false,
            selected: None,
            idle_tag: None,
        };

        conn.read_greeting().await?;

        if !conn.is_tls_active() && config.get_bool("starttls.enable", false) {
            if conn.capabilities.is_empty() {
                conn.capability().await?;
            }
            if conn.has_capability(&Capability::StartTls) {
                conn = conn.starttls().await?;
            } else if config.get_bool("starttls.required", false) {
                return Err(Error::Protocol(
                    "server does not support required STARTTLS".to_string(),
                ));
            }
        }

        Ok(conn)
    }

    /// Builds a connection from an already-open stream. Reads the
    /// greeting. Used by tests and custom transports.
    pub async fn from_stream(stream: MailStream, host: impl Into<String>) -> Result<Self> {
        let tls_active = stream.is_tls();
        let mut conn = Self {
            framed: FramedStream::new(stream),
            tags: crate::command::TagGenerator::default(),
            handlers: HandlerRegistry::new(),
            capabilities: Vec::new(),
            host: host.into(),
            tls: TlsSettings::default(),
            timeout: None,
            tls_active,
            open: true,
            closed_by_server: false,
            authenticated: false,
            selected: None,
            idle_tag: None,
        };
        conn.read_greeting().await?;
        Ok(conn)
    }

    async fn read_greeting(&mut self) -> Result<()> {
        let raw = self.framed.read_response().await?;
        match ResponseParser::parse(&raw)? {
            Response::Untagged(UntaggedResponse::Ok { code, .. }) => {
                if let Some(ResponseCode::Capability(caps)) = code {
                    self.capabilities = caps;
                }
                Ok(())
            }
            Response::Untagged(UntaggedResponse::PreAuth { code, .. }) => {
                self.authenticated = true;
                if let Some(ResponseCode::Capability(caps)) = code {
                    self.capabilities = caps;
                }
                Ok(())
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                self.closed_by_server = true;
                Err(Error::Bye(text))
            }
            other => Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
        }
    }

    /// Registers an unsolicited-response handler.
    pub fn register_handler(&mut self, handler: Box<dyn UnsolicitedHandler>) {
        self.handlers.register(handler);
    }

    /// Returns true if the connection is open and usable.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open && !self.closed_by_server
    }

    /// Returns true once the server has closed the session (BYE, timeout,
    /// or I/O failure). Such a connection must never be pooled again.
    #[must_use]
    pub const fn is_closed_by_server(&self) -> bool {
        self.closed_by_server
    }

    /// Returns true after successful authentication.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns the selected mailbox and its read-only bit.
    #[must_use]
    pub fn selected(&self) -> Option<(&Mailbox, bool)> {
        self.selected.as_ref().map(|(m, ro)| (m, *ro))
    }

    /// Returns the last seen capability list.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Returns true if the capability was advertised.
    #[must_use]
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Returns true once the stream is TLS (implicit or upgraded).
    #[must_use]
    pub const fn is_tls_active(&self) -> bool {
        self.tls_active
    }

    /// Issues a command and reads through its tagged completion.
    ///
    /// # Errors
    ///
    /// Propagates transport and parse errors; a NO/BAD completion is NOT
    /// an error at this level (see [`CommandOutcome::check`]).
    pub async fn run(&mut self, command: &Command) -> Result<CommandOutcome> {
        if !self.is_open() {
            return Err(Error::Net(mailwire_net::Error::ConnectionLost(
                "connection is closed".to_string(),
            )));
        }
        if self.idle_tag.is_some() {
            return Err(Error::InvalidState("IDLE in progress".to_string()));
        }

        let tag = self.tags.next();
        let parts = command.parts(&tag);
        let expect_bye = matches!(command, Command::Logout);

        let mut unsolicited = Vec::new();

        // Write text parts eagerly; before each literal payload, wait for
        // the server's continuation.
        for part in parts {
            match part {
                CommandPart::Text(text) => {
                    let result = self.framed.write_command(&text).await;
                    self.fail_on_transport(result)?;
                }
                CommandPart::Literal(payload) => {
                    match self
                        .await_continuation(&tag, &mut unsolicited, expect_bye)
                        .await?
                    {
                        ContinuationOutcome::Proceed => {
                            let result = self.framed.write_raw(&payload).await;
                            self.fail_on_transport(result)?;
                        }
                        // The server refused the literal; the command is over.
                        ContinuationOutcome::Completed(outcome) => return Ok(outcome),
                    }
                }
            }
        }

        self.read_until_tagged(&tag, unsolicited, expect_bye).await
    }

    async fn await_continuation(
        &mut self,
        tag: &str,
        unsolicited: &mut Vec<UntaggedResponse>,
        expect_bye: bool,
    ) -> Result<ContinuationOutcome> {
        loop {
            let raw = {
                let result = self.framed.read_response().await;
                self.fail_on_transport(result)?
            };
            match ResponseParser::parse(&raw)? {
                Response::Continuation { .. } => return Ok(ContinuationOutcome::Proceed),
                Response::Untagged(resp) => {
                    self.note_untagged(&resp, expect_bye);
                    if !self.handlers.dispatch(&resp) {
                        unsolicited.push(resp);
                    }
                }
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } if got.as_str() == tag => {
                    return Ok(ContinuationOutcome::Completed(CommandOutcome {
                        tag: got,
                        status,
                        code,
                        text,
                        unsolicited: std::mem::take(unsolicited),
                        raw,
                    }));
                }
                Response::Tagged { tag: got, .. } => {
                    return Err(Error::Protocol(format!(
                        "response for unknown tag {got} while awaiting continuation"
                    )));
                }
            }
        }
    }

    async fn read_until_tagged(
        &mut self,
        tag: &str,
        mut unsolicited: Vec<UntaggedResponse>,
        expect_bye: bool,
    ) -> Result<CommandOutcome> {
        loop {
            let raw = {
                let result = self.framed.read_response().await;
                self.fail_on_transport(result)?
            };
            match ResponseParser::parse(&raw)? {
                Response::Untagged(resp) => {
                    self.note_untagged(&resp, expect_bye);
                    if !self.handlers.dispatch(&resp) {
                        unsolicited.push(resp);
                    }
                }
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } if got.as_str() == tag => {
                    if let Some(ResponseCode::Capability(caps)) = &code {
                        self.capabilities = caps.clone();
                    }
                    return Ok(CommandOutcome {
                        tag: got,
                        status,
                        code,
                        text,
                        unsolicited,
                        raw,
                    });
                }
                Response::Tagged { tag: got, .. } => {
                    return Err(Error::Protocol(format!("response for unknown tag {got}")));
                }
                Response::Continuation { .. } => {
                    return Err(Error::Protocol(
                        "unexpected continuation request".to_string(),
                    ));
                }
            }
        }
    }

    fn note_untagged(&mut self, resp: &UntaggedResponse, expect_bye: bool) {
        if let UntaggedResponse::Bye { text, .. } = resp {
            if !expect_bye {
                tracing::debug!(%text, "server sent BYE");
                self.closed_by_server = true;
            }
        }
        if let UntaggedResponse::Capability(caps) = resp {
            self.capabilities = caps.clone();
        }
    }

    /// Marks the connection dead when a transport error occurs mid-command.
    fn fail_on_transport<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.poisons_connection() {
                self.open = false;
                self.closed_by_server = true;
            }
        }
        result
    }

    // === High-level operations ===

    /// CAPABILITY: refreshes and returns the capability list.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        let outcome = self.run(&Command::Capability).await?.check()?;
        for resp in &outcome.unsolicited {
            if let UntaggedResponse::Capability(caps) = resp {
                self.capabilities = caps.clone();
            }
        }
        Ok(self.capabilities.clone())
    }

    /// NOOP: polls for unsolicited updates and validates the connection.
    pub async fn noop(&mut self) -> Result<Vec<UntaggedResponse>> {
        let outcome = self.run(&Command::Noop).await?.check()?;
        Ok(outcome.unsolicited)
    }

    /// LOGIN with the plaintext command.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::Auth("LOGIN is disabled by the server".to_string()));
        }
        self.run(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?
        .check()
        .map_err(|err| match err {
            Error::No(text) | Error::Bad(text) => Error::Auth(text),
            other => other,
        })?;
        self.authenticated = true;
        Ok(())
    }

    /// AUTHENTICATE via the SASL mechanisms, trying candidates in policy
    /// order. A server rejection of one mechanism drops to the next;
    /// exhaustion maps to [`Error::Auth`].
    pub async fn authenticate(
        &mut self,
        credentials: &mailwire_sasl::Credentials,
        allowed: Option<&[String]>,
        realm: Option<&str>,
    ) -> Result<()> {
        let advertised = crate::types::auth_mechanisms(&self.capabilities);
        let candidates = mailwire_sasl::ranked(&advertised, allowed);
        if candidates.is_empty() {
            return Err(Error::Auth(
                "no mutually supported authentication mechanism".to_string(),
            ));
        }

        let mut last_reject = String::new();
        for mechanism in &candidates {
            let created = {
                let ctx = mailwire_sasl::select::MechanismContext {
                    credentials,
                    protocol: "imap",
                    host: self.host.as_str(),
                    realm,
                };
                mailwire_sasl::try_create(mechanism, &ctx)
            };
            let Ok(mut auth) = created else {
                continue;
            };

            tracing::debug!(mechanism, "attempting AUTHENTICATE");
            match self.authenticate_with(auth.as_mut()).await? {
                AuthAttempt::Success => {
                    self.authenticated = true;
                    return Ok(());
                }
                AuthAttempt::Rejected(text) => {
                    tracing::debug!(mechanism, %text, "mechanism rejected");
                    last_reject = text;
                }
            }
        }

        Err(Error::Auth(if last_reject.is_empty() {
            "all mechanisms rejected".to_string()
        } else {
            last_reject
        }))
    }

    async fn authenticate_with(
        &mut self,
        auth: &mut dyn mailwire_sasl::Authenticator,
    ) -> Result<AuthAttempt> {
        let tag = self.tags.next();

        let mut command = format!("{tag} AUTHENTICATE {}", auth.mechanism());
        if auth.has_initial_response() {
            let initial = auth
                .evaluate_challenge(b"")
                .map_err(|e| Error::Auth(e.to_string()))?;
            command.push(' ');
            command.push_str(&BASE64.encode(initial));
        }
        command.push_str("\r\n");
        let result = self.framed.write_command(command.as_bytes()).await;
        self.fail_on_transport(result)?;

        loop {
            let raw = {
                let result = self.framed.read_response().await;
                self.fail_on_transport(result)?
            };
            match ResponseParser::parse(&raw)? {
                Response::Continuation { text } => {
                    let challenge = match &text {
                        Some(data) => BASE64.decode(data.trim()).unwrap_or_default(),
                        None => Vec::new(),
                    };
                    match auth.evaluate_challenge(&challenge) {
                        Ok(reply) => {
                            let mut line = BASE64.encode(reply);
                            line.push_str("\r\n");
                            let result = self.framed.write_command(line.as_bytes()).await;
                            self.fail_on_transport(result)?;
                        }
                        Err(err) => {
                            // Cancel the exchange, drain the completion.
                            let result = self.framed.write_command(b"*\r\n").await;
                            self.fail_on_transport(result)?;
                            let _ = self
                                .read_until_tagged(tag.as_str(), Vec::new(), false)
                                .await?;
                            return Err(Error::Auth(err.to_string()));
                        }
                    }
                }
                Response::Untagged(resp) => {
                    self.note_untagged(&resp, false);
                    let _ = self.handlers.dispatch(&resp);
                }
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    ..
                } if got.as_str() == tag => {
                    if let Some(ResponseCode::Capability(caps)) = code {
                        self.capabilities = caps;
                    }
                    return Ok(match status {
                        Status::Ok => AuthAttempt::Success,
                        _ => AuthAttempt::Rejected(format!(
                            "{} rejected {status}",
                            auth.mechanism()
                        )),
                    });
                }
                Response::Tagged { tag: got, .. } => {
                    return Err(Error::Protocol(format!("response for unknown tag {got}")));
                }
            }
        }
    }

    /// STARTTLS: upgrades the stream and resets capabilities.
    ///
    /// Consumes the connection because the underlying stream is rebuilt;
    /// the upgraded connection is returned.
    pub async fn starttls(mut self) -> Result<Self> {
        self.run(&Command::StartTls).await?.check()?;

        let stream = self.framed.into_inner();
        let upgraded = stream.upgrade_to_tls(&self.host, &self.tls).await?;
        let mut framed = FramedStream::new(upgraded);
        framed.set_timeout(self.timeout);
        self.framed = framed;
        self.tls_active = true;

        // Pre-TLS capabilities no longer apply.
        self.capabilities.clear();
        self.capability().await?;

        Ok(self)
    }

    /// SELECT: opens a mailbox read-write.
    pub async fn select(&mut self, mailbox: &Mailbox) -> Result<MailboxStatus> {
        self.open_mailbox(mailbox, false).await
    }

    /// EXAMINE: opens a mailbox read-only.
    pub async fn examine(&mut self, mailbox: &Mailbox) -> Result<MailboxStatus> {
        self.open_mailbox(mailbox, true).await
    }

    async fn open_mailbox(&mut self, mailbox: &Mailbox, examine: bool) -> Result<MailboxStatus> {
        let command = if examine {
            Command::Examine(mailbox.clone())
        } else {
            Command::Select(mailbox.clone())
        };
        let outcome = self.run(&command).await?.check()?;

        let mut status = MailboxStatus {
            read_only: examine,
            ..MailboxStatus::default()
        };
        for resp in &outcome.unsolicited {
            match resp {
                UntaggedResponse::Exists(n) => status.exists = *n,
                UntaggedResponse::Recent(n) => status.recent = *n,
                UntaggedResponse::Flags(flags) => status.flags = flags.clone(),
                UntaggedResponse::Ok { code: Some(code), .. } => {
                    Self::apply_code(&mut status, code);
                }
                _ => {}
            }
        }
        match &outcome.code {
            Some(ResponseCode::ReadOnly) => status.read_only = true,
            Some(ResponseCode::ReadWrite) => status.read_only = false,
            _ => {}
        }

        self.selected = Some((mailbox.clone(), status.read_only));
        Ok(status)
    }

    fn apply_code(status: &mut MailboxStatus, code: &ResponseCode) {
        match code {
            ResponseCode::Unseen(seq) => status.unseen = Some(*seq),
            ResponseCode::UidNext(uid) => status.uid_next = Some(*uid),
            ResponseCode::UidValidity(v) => status.uid_validity = Some(*v),
            ResponseCode::PermanentFlags(flags) => {
                status.permanent_flags = flags.clone();
            }
            _ => {}
        }
    }

    /// CLOSE: closes the selected mailbox, expunging if it was selected
    /// read-write.
    pub async fn close_mailbox(&mut self) -> Result<()> {
        self.run(&Command::Close).await?.check()?;
        self.selected = None;
        Ok(())
    }

    /// LIST.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        let outcome = self
            .run(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?
            .check()?;

        Ok(outcome
            .unsolicited
            .into_iter()
            .filter_map(|resp| match resp {
                UntaggedResponse::List(list) => Some(list),
                _ => None,
            })
            .collect())
    }

    /// LSUB.
    pub async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        let outcome = self
            .run(&Command::Lsub {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?
            .check()?;

        Ok(outcome
            .unsolicited
            .into_iter()
            .filter_map(|resp| match resp {
                UntaggedResponse::Lsub(list) => Some(list),
                _ => None,
            })
            .collect())
    }

    /// STATUS.
    pub async fn status(
        &mut self,
        mailbox: &Mailbox,
        items: &[StatusQuery],
    ) -> Result<Vec<StatusItem>> {
        let outcome = self
            .run(&Command::Status {
                mailbox: mailbox.clone(),
                items: items.to_vec(),
            })
            .await?
            .check()?;

        for resp in outcome.unsolicited {
            if let UntaggedResponse::Status {
                mailbox: got,
                items,
            } = resp
            {
                if got.as_str().eq_ignore_ascii_case(mailbox.as_str()) {
                    return Ok(items);
                }
            }
        }
        Err(Error::Protocol("no STATUS data in response".to_string()))
    }

    /// FETCH / UID FETCH. Items are matched by type, not order.
    pub async fn fetch(
        &mut self,
        set: &SequenceSet,
        items: crate::command::FetchItems,
        uid: bool,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        let outcome = self
            .run(&Command::Fetch {
                set: set.clone(),
                items,
                uid,
            })
            .await?
            .check()?;
        Ok(collect_fetches(outcome.unsolicited))
    }

    /// SEARCH / UID SEARCH.
    pub async fn search(
        &mut self,
        criteria: crate::command::SearchCriteria,
        uid: bool,
    ) -> Result<Vec<SeqNum>> {
        let outcome = self.run(&Command::Search { criteria, uid }).await?.check()?;

        let mut result = Vec::new();
        for resp in outcome.unsolicited {
            if let UntaggedResponse::Search(nums) = resp {
                result.extend(nums);
            }
        }
        Ok(result)
    }

    /// STORE / UID STORE. Returns the untagged FETCH echoes.
    pub async fn store(
        &mut self,
        set: &SequenceSet,
        action: crate::command::StoreAction,
        silent: bool,
        uid: bool,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        let outcome = self
            .run(&Command::Store {
                set: set.clone(),
                action,
                silent,
                uid,
            })
            .await?
            .check()?;
        Ok(collect_fetches(outcome.unsolicited))
    }

    /// COPY / UID COPY.
    pub async fn copy(&mut self, set: &SequenceSet, mailbox: &Mailbox, uid: bool) -> Result<()> {
        self.run(&Command::Copy {
            set: set.clone(),
            mailbox: mailbox.clone(),
            uid,
        })
        .await?
        .check()?;
        Ok(())
    }

    /// APPEND. The message goes as one literal after the continuation.
    pub async fn append(
        &mut self,
        mailbox: &Mailbox,
        flags: Option<Flags>,
        message: Vec<u8>,
    ) -> Result<()> {
        self.run(&Command::Append {
            mailbox: mailbox.clone(),
            flags,
            message,
        })
        .await?
        .check()?;
        Ok(())
    }

    /// EXPUNGE. Returns the expunged sequence numbers in arrival order.
    pub async fn expunge(&mut self) -> Result<Vec<SeqNum>> {
        let outcome = self.run(&Command::Expunge).await?.check()?;

        Ok(outcome
            .unsolicited
            .into_iter()
            .filter_map(|resp| match resp {
                UntaggedResponse::Expunge(seq) => Some(seq),
                _ => None,
            })
            .collect())
    }

    /// NAMESPACE.
    pub async fn namespace(&mut self) -> Result<Option<UntaggedResponse>> {
        let outcome = self.run(&Command::Namespace).await?.check()?;
        Ok(outcome
            .unsolicited
            .into_iter()
            .find(|resp| matches!(resp, UntaggedResponse::Namespace { .. })))
    }

    /// GETQUOTAROOT: returns the QUOTAROOT and QUOTA responses.
    pub async fn get_quota_root(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Vec<UntaggedResponse>> {
        let outcome = self
            .run(&Command::GetQuotaRoot(mailbox.clone()))
            .await?
            .check()?;
        Ok(outcome
            .unsolicited
            .into_iter()
            .filter(|resp| {
                matches!(
                    resp,
                    UntaggedResponse::QuotaRoot { .. } | UntaggedResponse::Quota { .. }
                )
            })
            .collect())
    }

    /// GETACL.
    pub async fn get_acl(&mut self, mailbox: &Mailbox) -> Result<Vec<UntaggedResponse>> {
        let outcome = self.run(&Command::GetAcl(mailbox.clone())).await?.check()?;
        Ok(outcome
            .unsolicited
            .into_iter()
            .filter(|resp| matches!(resp, UntaggedResponse::Acl { .. }))
            .collect())
    }

    /// MYRIGHTS.
    pub async fn my_rights(&mut self, mailbox: &Mailbox) -> Result<Option<String>> {
        let outcome = self.run(&Command::MyRights(mailbox.clone())).await?.check()?;
        Ok(outcome.unsolicited.into_iter().find_map(|resp| match resp {
            UntaggedResponse::MyRights { rights, .. } => Some(rights),
            _ => None,
        }))
    }

    /// Enters IDLE. The server acknowledges with a continuation.
    pub async fn idle_start(&mut self) -> Result<()> {
        if self.idle_tag.is_some() {
            return Err(Error::InvalidState("IDLE already in progress".to_string()));
        }
        let tag = self.tags.next();
        let line = format!("{tag} IDLE\r\n");
        let result = self.framed.write_command(line.as_bytes()).await;
        self.fail_on_transport(result)?;

        loop {
            let raw = {
                let result = self.framed.read_response().await;
                self.fail_on_transport(result)?
            };
            match ResponseParser::parse(&raw)? {
                Response::Continuation { .. } => {
                    self.idle_tag = Some(Tag::new(tag));
                    return Ok(());
                }
                Response::Untagged(resp) => {
                    self.note_untagged(&resp, false);
                    let _ = self.handlers.dispatch(&resp);
                }
                Response::Tagged { status, text, .. } => {
                    return match status {
                        Status::No => Err(Error::No(text)),
                        _ => Err(Error::Bad(text)),
                    };
                }
            }
        }
    }

    /// Waits up to `duration` for unsolicited responses while idling.
    /// Returns the responses seen; an empty vector means the wait timed
    /// out quietly.
    pub async fn idle_wait(&mut self, duration: Duration) -> Result<Vec<UntaggedResponse>> {
        if self.idle_tag.is_none() {
            return Err(Error::InvalidState("not idling".to_string()));
        }

        match tokio::time::timeout(duration, self.framed.read_response()).await {
            Err(_) => Ok(Vec::new()),
            Ok(raw) => {
                let raw = self.fail_on_transport(raw)?;
                match ResponseParser::parse(&raw)? {
                    Response::Untagged(resp) => {
                        self.note_untagged(&resp, false);
                        if self.handlers.dispatch(&resp) {
                            Ok(Vec::new())
                        } else {
                            Ok(vec![resp])
                        }
                    }
                    other => Err(Error::Protocol(format!(
                        "unexpected response during IDLE: {other:?}"
                    ))),
                }
            }
        }
    }

    /// Ends IDLE with DONE and drains the tagged completion.
    pub async fn idle_done(&mut self) -> Result<Vec<UntaggedResponse>> {
        let Some(tag) = self.idle_tag.take() else {
            return Err(Error::InvalidState("not idling".to_string()));
        };
        let result = self.framed.write_command(b"DONE\r\n").await;
        self.fail_on_transport(result)?;

        let outcome = self
            .read_until_tagged(tag.as_str(), Vec::new(), false)
            .await?
            .check()?;
        Ok(outcome.unsolicited)
    }

    /// LOGOUT: the server replies BYE then the tagged OK, and the
    /// connection is closed.
    pub async fn logout(&mut self) -> Result<()> {
        let result = self.run(&Command::Logout).await;
        self.open = false;
        match result {
            Ok(outcome) => {
                outcome.check()?;
                Ok(())
            }
            // The server may just drop the connection after BYE.
            Err(Error::Net(mailwire_net::Error::UnexpectedEof)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for ImapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnection")
            .field("host", &self.host)
            .field("open", &self.open)
            .field("authenticated", &self.authenticated)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

enum ContinuationOutcome {
    Proceed,
    Completed(CommandOutcome),
}

enum AuthAttempt {
    Success,
    Rejected(String),
}

fn collect_fetches(unsolicited: Vec<UntaggedResponse>) -> Vec<(SeqNum, Vec<FetchItem>)> {
    unsolicited
        .into_iter()
        .filter_map(|resp| match resp {
            UntaggedResponse::Fetch { seq, items } => Some((seq, items)),
            _ => None,
        })
        .collect()
}
