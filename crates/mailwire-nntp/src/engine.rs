//! The NNTP command engine.

#![allow(clippy::missing_errors_doc)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use mailwire_net::{Capabilities, MailStream, ProtocolConfig, TextStream};
use mailwire_sasl::Credentials;

use crate::{Error, Result};

/// One status line: a three-digit code plus text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The status code.
    pub code: u16,
    /// The rest of the line.
    pub text: String,
}

impl Reply {
    fn parse(line: &str) -> Result<Self> {
        if line.len() < 3 {
            return Err(Error::Protocol(format!("status line too short: {line}")));
        }
        let code = line[0..3]
            .parse::<u16>()
            .map_err(|_| Error::Protocol(format!("invalid status code: {line}")))?;
        Ok(Self {
            code,
            text: line.get(4..).unwrap_or("").to_string(),
        })
    }

    /// Returns true for 2xx codes.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }
}

/// GROUP command result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStatus {
    /// Estimated article count.
    pub count: u64,
    /// Lowest article number.
    pub first: u64,
    /// Highest article number.
    pub last: u64,
}

/// A single NNTP connection.
pub struct NntpConnection {
    stream: TextStream<MailStream>,
    capabilities: Capabilities,
    host: String,
    posting_allowed: bool,
    open: bool,
    closed_by_server: bool,
    authenticated: bool,
}

impl NntpConnection {
    /// Opens a connection, classifies the welcome (200 posting allowed,
    /// 201 read-only), and probes LIST EXTENSIONS.
    pub async fn connect(config: &ProtocolConfig) -> Result<Self> {
        let stream = mailwire_net::connect(config, None).await?;
        let mut text = TextStream::new(stream);
        text.set_timeout(config.read_timeout());

        let mut conn = Self {
            stream: text,
            capabilities: Capabilities::new(),
            host: config.host().to_string(),
            posting_allowed: false,
            open: true,
            closed_by_server: false,
            authenticated: false,
        };
        conn.read_welcome().await?;
        conn.load_extensions().await;
        Ok(conn)
    }

    /// Builds a connection from an open stream and reads the welcome.
    /// Extensions are not probed. Used by tests.
    pub async fn from_stream(stream: MailStream, host: impl Into<String>) -> Result<Self> {
        let mut conn = Self {
            stream: TextStream::new(stream),
            capabilities: Capabilities::new(),
            host: host.into(),
            posting_allowed: false,
            open: true,
            closed_by_server: false,
            authenticated: false,
        };
        conn.read_welcome().await?;
        Ok(conn)
    }

    async fn read_welcome(&mut self) -> Result<()> {
        let reply = self.read_reply().await?;
        match reply.code {
            200 => {
                self.posting_allowed = true;
                Ok(())
            }
            201 => {
                self.posting_allowed = false;
                Ok(())
            }
            code => Err(Error::CommandFailed {
                command: "welcome".to_string(),
                code,
                message: reply.text,
            }),
        }
    }

    /// Probes the capability and mechanism maps. Pre-3977 servers reject
    /// the command; that is not an error.
    async fn load_extensions(&mut self) {
        self.capabilities.clear();
        match self.command_multiline("LIST EXTENSIONS", "LIST EXTENSIONS").await {
            Ok((_, body)) => {
                for line in String::from_utf8_lossy(&body).lines() {
                    let trimmed = line.trim();
                    if let Some(mechs) = trimmed.strip_prefix("SASL ") {
                        self.capabilities.insert("SASL", mechs.trim());
                    } else {
                        self.capabilities.add_line(trimmed);
                    }
                }
            }
            Err(err) => {
                tracing::debug!(%err, "LIST EXTENSIONS not supported");
            }
        }
    }

    /// The advertised extensions.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// True when the welcome advertised posting permission.
    #[must_use]
    pub const fn posting_allowed(&self) -> bool {
        self.posting_allowed
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

    fn fail_on_transport<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.poisons_connection() {
                self.open = false;
                self.closed_by_server = true;
            }
        }
        result
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let read = self.stream.read_line().await.map_err(Error::from);
        let line = self.fail_on_transport(read)?;
        Reply::parse(&line)
    }

    /// Sends one command and returns the status reply, whatever its code.
    pub async fn command(&mut self, line: &str, redacted: &str) -> Result<Reply> {
        if !self.is_open() {
            return Err(Error::Net(mailwire_net::Error::ConnectionLost(
                "connection is closed".to_string(),
            )));
        }
        tracing::trace!(command = redacted, "NNTP send");
        let write = self.stream.write_line(line).await.map_err(Error::from);
        self.fail_on_transport(write)?;
        self.read_reply().await
    }

    async fn command_expect(&mut self, line: &str, redacted: &str, expect: u16) -> Result<Reply> {
        let reply = self.command(line, redacted).await?;
        if reply.code == expect {
            Ok(reply)
        } else {
            Err(Error::CommandFailed {
                command: redacted.to_string(),
                code: reply.code,
                message: reply.text,
            })
        }
    }

    /// Sends a command whose success response carries a multi-line body.
    pub async fn command_multiline(
        &mut self,
        line: &str,
        redacted: &str,
    ) -> Result<(Reply, Vec<u8>)> {
        let reply = self.command(line, redacted).await?;
        if !reply.is_success() && !(100..200).contains(&reply.code) {
            return Err(Error::CommandFailed {
                command: redacted.to_string(),
                code: reply.code,
                message: reply.text,
            });
        }
        let body = {
            let read = self.stream.read_multiline().await.map_err(Error::from);
            self.fail_on_transport(read)?
        };
        Ok((reply, body))
    }

    // === Authentication (RFC 4643 / RFC 2980) ===

    /// Authenticates per configuration: AUTHINFO SASL when enabled and
    /// mechanisms are advertised, AUTHINFO USER/PASS otherwise.
    pub async fn login(
        &mut self,
        config: &ProtocolConfig,
        credentials: &Credentials,
    ) -> Result<()> {
        if config.get_bool("sasl.enable", false) {
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
                    .authinfo_sasl(
                        credentials,
                        &advertised,
                        allowed.as_deref(),
                        config.get("sasl.realm"),
                    )
                    .await
                {
                    Ok(()) => return Ok(()),
                    Err(Error::Auth(reason)) => {
                        tracing::debug!(%reason, "AUTHINFO SASL failed, trying USER/PASS");
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        self.authinfo_user_pass(&credentials.username, &credentials.password)
            .await
    }

    /// AUTHINFO USER / AUTHINFO PASS. Some servers accept the user alone
    /// with 281.
    pub async fn authinfo_user_pass(&mut self, user: &str, password: &str) -> Result<()> {
        let reply = self
            .command(&format!("AUTHINFO USER {user}"), "AUTHINFO USER")
            .await?;
        match reply.code {
            281 => {
                self.authenticated = true;
                Ok(())
            }
            381 => {
                let reply = self
                    .command(&format!("AUTHINFO PASS {password}"), "AUTHINFO PASS")
                    .await?;
                if reply.code == 281 {
                    self.authenticated = true;
                    Ok(())
                } else {
                    Err(Error::Auth(reply.text))
                }
            }
            _ => Err(Error::Auth(reply.text)),
        }
    }

    /// AUTHINFO SIMPLE: the server continues with 350, then user and
    /// password travel on one line.
    pub async fn authinfo_simple(&mut self, user: &str, password: &str) -> Result<()> {
        let reply = self.command("AUTHINFO SIMPLE", "AUTHINFO SIMPLE").await?;
        if reply.code != 350 {
            return Err(Error::Auth(reply.text));
        }

        let reply = self
            .command(&format!("{user} {password}"), "AUTHINFO SIMPLE response")
            .await?;
        if reply.is_success() {
            self.authenticated = true;
            Ok(())
        } else {
            Err(Error::Auth(reply.text))
        }
    }

    /// AUTHINFO SASL with 383 challenge continuations, candidates in
    /// policy order.
    pub async fn authinfo_sasl(
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
                    protocol: "nntp",
                    host: self.host.as_str(),
                    realm,
                };
                mailwire_sasl::try_create(mechanism, &ctx)
            };
            let Ok(mut auth) = created else { continue };

            match self.sasl_exchange(auth.as_mut()).await? {
                None => {
                    self.authenticated = true;
                    return Ok(());
                }
                Some(reject) => last_reject = reject,
            }
        }

        Err(Error::Auth(if last_reject.is_empty() {
            "all mechanisms rejected".to_string()
        } else {
            last_reject
        }))
    }

    async fn sasl_exchange(
        &mut self,
        auth: &mut dyn mailwire_sasl::Authenticator,
    ) -> Result<Option<String>> {
        let mut command = format!("AUTHINFO SASL {}", auth.mechanism());
        if auth.has_initial_response() {
            let initial = auth
                .evaluate_challenge(b"")
                .map_err(|e| Error::Auth(e.to_string()))?;
            command.push(' ');
            command.push_str(&BASE64.encode(initial));
        }

        let mut reply = self.command(&command, "AUTHINFO SASL").await?;

        while reply.code == 383 {
            let challenge = BASE64.decode(reply.text.trim()).unwrap_or_default();
            match auth.evaluate_challenge(&challenge) {
                Ok(response) => {
                    reply = self
                        .command(&BASE64.encode(response), "AUTHINFO SASL response")
                        .await?;
                }
                Err(err) => {
                    let _ = self.command("*", "AUTHINFO SASL cancel").await?;
                    return Err(Error::Auth(err.to_string()));
                }
            }
        }

        if reply.code == 281 {
            Ok(None)
        } else {
            Ok(Some(format!(
                "{} rejected with {}: {}",
                auth.mechanism(),
                reply.code,
                reply.text
            )))
        }
    }

    // === Reader commands ===

    /// GROUP: selects a newsgroup.
    pub async fn group(&mut self, name: &str) -> Result<GroupStatus> {
        let reply = self
            .command_expect(&format!("GROUP {name}"), "GROUP", 211)
            .await?;

        let mut words = reply.text.split_whitespace();
        let mut next = || {
            words
                .next()
                .and_then(|w| w.parse::<u64>().ok())
                .ok_or_else(|| Error::Protocol(format!("bad GROUP reply: {}", reply.text)))
        };
        Ok(GroupStatus {
            count: next()?,
            first: next()?,
            last: next()?,
        })
    }

    /// ARTICLE by message-id or number: the full article.
    pub async fn article(&mut self, id: &str) -> Result<Vec<u8>> {
        let (_, body) = self
            .command_multiline(&format!("ARTICLE {id}"), "ARTICLE")
            .await?;
        Ok(body)
    }

    /// HEAD: just the headers.
    pub async fn head(&mut self, id: &str) -> Result<Vec<u8>> {
        let (_, body) = self.command_multiline(&format!("HEAD {id}"), "HEAD").await?;
        Ok(body)
    }

    /// BODY: just the body.
    pub async fn body(&mut self, id: &str) -> Result<Vec<u8>> {
        let (_, body) = self.command_multiline(&format!("BODY {id}"), "BODY").await?;
        Ok(body)
    }

    /// POST: offers an article. The server invites with 340; the article
    /// travels dot-stuffed with the same terminator rules as SMTP DATA,
    /// and 240 confirms acceptance.
    pub async fn post(&mut self, article: &[u8]) -> Result<()> {
        if !self.posting_allowed {
            return Err(Error::PostingNotAllowed);
        }

        self.command_expect("POST", "POST", 340).await?;

        let write = self
            .stream
            .write_dot_stuffed(article)
            .await
            .map_err(Error::from);
        self.fail_on_transport(write)?;

        let reply = self.read_reply().await?;
        if reply.code == 240 {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: "POST".to_string(),
                code: reply.code,
                message: reply.text,
            })
        }
    }

    /// QUIT: ends the session.
    pub async fn quit(&mut self) -> Result<()> {
        let result = self.command("QUIT", "QUIT").await;
        self.open = false;
        match result {
            Ok(_) => Ok(()),
            Err(Error::Net(mailwire_net::Error::UnexpectedEof)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for NntpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NntpConnection")
            .field("host", &self.host)
            .field("posting_allowed", &self.posting_allowed)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}
