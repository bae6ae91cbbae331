//! The POP3 command engine.

#![allow(clippy::missing_errors_doc)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use mailwire_net::stream::TlsSettings;
use mailwire_net::{Capabilities, MailStream, ProtocolConfig, TextStream};
use mailwire_sasl::Credentials;

use crate::{Error, Result};

/// One status line from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`, with the trailing text.
    Ok(String),
    /// Bare `+` challenge (SASL continuation), with the base64 payload.
    Challenge(String),
    /// `-ERR`, with the error text.
    Err(String),
}

impl Reply {
    fn parse(line: &str) -> Result<Self> {
        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(Self::Ok(rest.trim_start().to_string()))
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            Ok(Self::Err(rest.trim_start().to_string()))
        } else if let Some(rest) = line.strip_prefix('+') {
            // A lone "+" is a SASL challenge line.
            Ok(Self::Challenge(rest.trim_start().to_string()))
        } else {
            Err(Error::Protocol(format!("unparseable status line: {line}")))
        }
    }
}

/// A single POP3 connection.
pub struct Pop3Connection {
    stream: TextStream<MailStream>,
    capabilities: Capabilities,
    greeting_timestamp: Option<String>,
    host: String,
    tls: TlsSettings,
    timeout: Option<std::time::Duration>,
    tls_active: bool,
    open: bool,
    closed_by_server: bool,
    authenticated: bool,
}

impl Pop3Connection {
    /// Opens a connection, reads the greeting, probes CAPA, and performs
    /// the STLS upgrade when configured.
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
        let tls_active = stream.is_tls();
        let timeout = config.read_timeout();
        let mut text = TextStream::new(stream);
        text.set_timeout(timeout);

        let mut conn = Self {
            stream: text,
            capabilities: Capabilities::new(),
            greeting_timestamp: None,
            host: config.host().to_string(),
            tls: TlsSettings::from_config(config),
            timeout,
            tls_active,
            open: true,
            closed_by_server: false,
            authenticated: false,
        };

        let greeting = conn.read_status().await?;
        match greeting {
            Reply::Ok(text) => {
                conn.greeting_timestamp =
                    mailwire_sasl::apop::greeting_timestamp(&text).map(str::to_string);
            }
            other => {
                return Err(Error::Protocol(format!("bad greeting: {other:?}")));
            }
        }

        conn.load_capabilities().await;

        if config.get_bool("starttls.enable", false) && !conn.tls_active {
            if conn.capabilities.contains("STLS") {
                conn = conn.stls().await?;
            } else if config.get_bool("starttls.required", false) {
                return Err(Error::Protocol(
                    "server does not support required STLS".to_string(),
                ));
            }
        }

        Ok(conn)
    }

    /// Builds a connection from an already-open stream and consumes the
    /// greeting. Capabilities are not probed. Used by tests.
    pub async fn from_stream(stream: MailStream, host: impl Into<String>) -> Result<Self> {
        let tls_active = stream.is_tls();
        let mut conn = Self {
            stream: TextStream::new(stream),
            capabilities: Capabilities::new(),
            greeting_timestamp: None,
            host: host.into(),
            tls: TlsSettings::default(),
            timeout: None,
            tls_active,
            open: true,
            closed_by_server: false,
            authenticated: false,
        };

        match conn.read_status().await? {
            Reply::Ok(text) => {
                conn.greeting_timestamp =
                    mailwire_sasl::apop::greeting_timestamp(&text).map(str::to_string);
                Ok(conn)
            }
            other => Err(Error::Protocol(format!("bad greeting: {other:?}"))),
        }
    }

    /// Returns the advertised capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the APOP timestamp from the greeting, if any.
    #[must_use]
    pub fn greeting_timestamp(&self) -> Option<&str> {
        self.greeting_timestamp.as_deref()
    }

    /// Returns true while the connection is usable.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open && !self.closed_by_server
    }

    /// Returns true once authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn read_status(&mut self) -> Result<Reply> {
        let read = self.stream.read_line().await.map_err(Error::from);
        let line = self.fail_on_transport(read)?;
        Reply::parse(&line)
    }

    fn fail_on_transport<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.poisons_connection() {
                self.open = false;
                self.closed_by_server = true;
            }
        }
        result
    }

    /// Sends one command and returns its `+OK` payload.
    ///
    /// `redacted` replaces the command text in errors and logs, so
    /// PASS/APOP secrets never leave the engine.
    pub async fn command(&mut self, line: &str, redacted: &str) -> Result<String> {
        if !self.is_open() {
            return Err(Error::Net(mailwire_net::Error::ConnectionLost(
                "connection is closed".to_string(),
            )));
        }

        tracing::trace!(command = redacted, "POP3 send");
        let write = self.stream.write_line(line).await.map_err(Error::from);
        self.fail_on_transport(write)?;

        match self.read_status().await? {
            Reply::Ok(text) => Ok(text),
            Reply::Err(reply) => Err(Error::CommandFailed {
                command: redacted.to_string(),
                reply,
            }),
            Reply::Challenge(_) => Err(Error::Protocol(format!(
                "unexpected continuation after {redacted}"
            ))),
        }
    }

    /// Sends a command expecting a multi-line response; returns the `+OK`
    /// payload and the dot-unstuffed body.
    pub async fn command_multiline(&mut self, line: &str, redacted: &str) -> Result<(String, Vec<u8>)> {
        let status = self.command(line, redacted).await?;
        let body = {
            let read = self.stream.read_multiline().await.map_err(Error::from);
            self.fail_on_transport(read)?
        };
        Ok((status, body))
    }

    async fn load_capabilities(&mut self) {
        self.capabilities.clear();
        match self.command_multiline("CAPA", "CAPA").await {
            Ok((_, body)) => {
                for line in String::from_utf8_lossy(&body).lines() {
                    // RFC 2449 spells the mechanism list "SASL PLAIN ...".
                    if let Some(mechs) = line.strip_prefix("SASL ") {
                        self.capabilities.insert("SASL", mechs.trim());
                    } else {
                        self.capabilities.add_line(line);
                    }
                }
            }
            Err(err) => {
                // Pre-CAPA servers answer -ERR; probe for capabilities as
                // before RFC 2449.
                tracing::debug!(%err, "CAPA not supported");
            }
        }
    }

    /// STLS: upgrades to TLS over the same connection and re-probes CAPA.
    ///
    /// Consumes the connection because the stream is rebuilt; the
    /// upgraded connection is returned.
    pub async fn stls(mut self) -> Result<Self> {
        self.command("STLS", "STLS").await?;

        let Self {
            stream,
            capabilities,
            greeting_timestamp,
            host,
            tls,
            timeout,
            open,
            closed_by_server,
            authenticated,
            ..
        } = self;

        let upgraded = stream.into_inner().upgrade_to_tls(&host, &tls).await?;
        let mut stream = TextStream::new(upgraded);
        stream.set_timeout(timeout);

        let mut conn = Self {
            stream,
            capabilities,
            greeting_timestamp,
            host,
            tls,
            timeout,
            tls_active: true,
            open,
            closed_by_server,
            authenticated,
        };
        conn.load_capabilities().await;
        Ok(conn)
    }

    // === Authentication ===

    /// Authenticates per policy: APOP when enabled and a timestamp is
    /// present, then the SASL bridge when `auth.enable`, then USER/PASS.
    pub async fn login(
        &mut self,
        config: &ProtocolConfig,
        credentials: &Credentials,
    ) -> Result<()> {
        if config.get_bool("apop.enable", false) {
            if let Some(timestamp) = self.greeting_timestamp.clone() {
                return self.apop(&credentials.username, &credentials.password, &timestamp).await;
            }
        }

        if config.get_bool("auth.enable", false) || config.get_bool("sasl.enable", false) {
            let advertised = self.capabilities.get("SASL").map(|mechs| {
                mechs
                    .split_whitespace()
                    .map(str::to_uppercase)
                    .collect::<Vec<_>>()
            });
            if let Some(advertised) = advertised {
                let allowed: Option<Vec<String>> =
                    config.get("sasl.mechanisms").map(|list| {
                        list.split_whitespace().map(str::to_uppercase).collect()
                    });
                match self
                    .auth_sasl(credentials, &advertised, allowed.as_deref(), config.get("sasl.realm"))
                    .await
                {
                    Ok(()) => return Ok(()),
                    Err(Error::Auth(reason)) => {
                        tracing::debug!(%reason, "AUTH failed, falling back to USER/PASS");
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        self.user_pass(&credentials.username, &credentials.password)
            .await
    }

    /// APOP: one command with the MD5 digest of timestamp plus secret.
    pub async fn apop(&mut self, user: &str, secret: &str, timestamp: &str) -> Result<()> {
        let digest = mailwire_sasl::apop::digest(timestamp, secret);
        match self
            .command(&format!("APOP {user} {digest}"), "APOP")
            .await
        {
            Ok(_) => {
                self.authenticated = true;
                Ok(())
            }
            Err(Error::CommandFailed { reply, .. }) => Err(Error::Auth(reply)),
            Err(other) => Err(other),
        }
    }

    /// USER then PASS.
    pub async fn user_pass(&mut self, user: &str, password: &str) -> Result<()> {
        let map_reject = |err: Error| match err {
            Error::CommandFailed { reply, .. } => Error::Auth(reply),
            other => other,
        };
        self.command(&format!("USER {user}"), "USER").await.map_err(map_reject)?;
        self.command(&format!("PASS {password}"), "PASS").await.map_err(map_reject)?;
        self.authenticated = true;
        Ok(())
    }

    /// The AUTH SASL bridge (RFC 5034): candidates in policy order, each
    /// rejection recoverable until the list is exhausted.
    pub async fn auth_sasl(
        &mut self,
        credentials: &Credentials,
        advertised: &[String],
        allowed: Option<&[String]>,
        realm: Option<&str>,
    ) -> Result<()> {
        let candidates = mailwire_sasl::ranked(advertised, allowed);
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
                    protocol: "pop3",
                    host: self.host.as_str(),
                    realm,
                };
                mailwire_sasl::try_create(mechanism, &ctx)
            };
            let Ok(mut auth) = created else { continue };

            match self.auth_exchange(auth.as_mut()).await? {
                Some(reject) => last_reject = reject,
                None => {
                    self.authenticated = true;
                    return Ok(());
                }
            }
        }

        Err(Error::Auth(if last_reject.is_empty() {
            "all mechanisms rejected".to_string()
        } else {
            last_reject
        }))
    }

    /// Runs one AUTH exchange; `None` on success, `Some(reason)` when the
    /// server rejected the mechanism.
    async fn auth_exchange(
        &mut self,
        auth: &mut dyn mailwire_sasl::Authenticator,
    ) -> Result<Option<String>> {
        let mut command = format!("AUTH {}", auth.mechanism());
        if auth.has_initial_response() {
            let initial = auth
                .evaluate_challenge(b"")
                .map_err(|e| Error::Auth(e.to_string()))?;
            command.push(' ');
            command.push_str(&BASE64.encode(initial));
        }

        let write = self.stream.write_line(&command).await.map_err(Error::from);
        self.fail_on_transport(write)?;

        loop {
            match self.read_status().await? {
                Reply::Ok(_) => return Ok(None),
                Reply::Err(reply) => return Ok(Some(reply)),
                Reply::Challenge(data) => {
                    let challenge = BASE64.decode(data.trim()).unwrap_or_default();
                    match auth.evaluate_challenge(&challenge) {
                        Ok(reply) => {
                            let line = BASE64.encode(reply);
                            let write =
                                self.stream.write_line(&line).await.map_err(Error::from);
                            self.fail_on_transport(write)?;
                        }
                        Err(err) => {
                            // Cancel the exchange.
                            let write = self.stream.write_line("*").await.map_err(Error::from);
                            self.fail_on_transport(write)?;
                            let _ = self.read_status().await?;
                            return Err(Error::Auth(err.to_string()));
                        }
                    }
                }
            }
        }
    }

    // === Mailbox operations ===

    /// STAT: message count and total byte count.
    pub async fn stat(&mut self) -> Result<(u32, u64)> {
        let status = self.command("STAT", "STAT").await?;
        let mut words = status.split_whitespace();
        let count = words
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| Error::Protocol(format!("bad STAT reply: {status}")))?;
        let bytes = words
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| Error::Protocol(format!("bad STAT reply: {status}")))?;
        Ok((count, bytes))
    }

    /// LIST n: size of one message in bytes.
    pub async fn list(&mut self, msg: u32) -> Result<u64> {
        let status = self.command(&format!("LIST {msg}"), "LIST").await?;
        status
            .split_whitespace()
            .nth(1)
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| Error::Protocol(format!("bad LIST reply: {status}")))
    }

    /// UIDL n: the server-assigned unique id of one message.
    pub async fn uidl(&mut self, msg: u32) -> Result<String> {
        let status = self.command(&format!("UIDL {msg}"), "UIDL").await?;
        status
            .split_whitespace()
            .nth(1)
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("bad UIDL reply: {status}")))
    }

    /// TOP n 0: the message headers.
    pub async fn top(&mut self, msg: u32, lines: u32) -> Result<Vec<u8>> {
        let (_, body) = self
            .command_multiline(&format!("TOP {msg} {lines}"), "TOP")
            .await?;
        Ok(body)
    }

    /// RETR n: the full message.
    pub async fn retr(&mut self, msg: u32) -> Result<Vec<u8>> {
        let (_, body) = self.command_multiline(&format!("RETR {msg}"), "RETR").await?;
        Ok(body)
    }

    /// DELE n: stages a delete, committed by QUIT.
    pub async fn dele(&mut self, msg: u32) -> Result<()> {
        self.command(&format!("DELE {msg}"), "DELE").await?;
        Ok(())
    }

    /// RSET: unstages every delete.
    pub async fn rset(&mut self) -> Result<()> {
        self.command("RSET", "RSET").await?;
        Ok(())
    }

    /// NOOP.
    pub async fn noop(&mut self) -> Result<()> {
        self.command("NOOP", "NOOP").await?;
        Ok(())
    }

    /// QUIT: commits staged deletes and ends the session.
    pub async fn quit(&mut self) -> Result<()> {
        let result = self.command("QUIT", "QUIT").await;
        self.open = false;
        match result {
            Ok(_) => Ok(()),
            // Some servers drop the connection instead of confirming.
            Err(Error::Net(mailwire_net::Error::UnexpectedEof)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for Pop3Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pop3Connection")
            .field("host", &self.host)
            .field("open", &self.open)
            .field("authenticated", &self.authenticated)
            .finish_non_exhaustive()
    }
}
