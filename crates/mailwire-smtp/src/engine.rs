//! The ESMTP engine and transport.

#![allow(clippy::missing_errors_doc)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use mailwire_net::stream::TlsSettings;
use mailwire_net::{Capabilities, MailStream, ProtocolConfig, TextStream, dot_stuffed_len};
use mailwire_sasl::Credentials;

use crate::mime::MimeMessage;
use crate::types::{Address, Reply, ReplyCode, SendResult, SendStatus};
use crate::{Error, Result};

/// A failed send carrying whatever per-recipient status accumulated
/// before the failure.
#[derive(Debug)]
pub struct SendError {
    /// Status entries for the recipients offered before the failure.
    pub partial: Vec<SendStatus>,
    /// The underlying error.
    pub source: Error,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "send failed after {} recipients: {}", self.partial.len(), self.source)
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// A single ESMTP connection.
pub struct SmtpConnection {
    stream: TextStream<MailStream>,
    capabilities: Capabilities,
    host: String,
    local_hostname: String,
    tls: TlsSettings,
    timeout: Option<std::time::Duration>,
    tls_active: bool,
    open: bool,
    closed_by_server: bool,
    authenticated: bool,
}

impl SmtpConnection {
    /// Opens a connection, reads the 220 greeting, performs the
    /// EHLO/HELO handshake and the STARTTLS upgrade when configured.
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
        let mut conn = Self::wrap(stream, config);

        let greeting = conn.read_reply(1).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::command_failed(
                "greeting",
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }

        conn.handshake(config).await?;

        if config.get_bool("starttls.enable", false) && !conn.tls_active {
            if conn.capabilities.contains("STARTTLS") {
                conn = conn.starttls().await?;
                // Capabilities reset; greet again over TLS.
                conn.handshake(config).await?;
            } else if config.get_bool("starttls.required", false) {
                return Err(Error::NotSupported("required STARTTLS".to_string()));
            }
        }

        Ok(conn)
    }

    /// Builds a connection from an open stream and reads the greeting.
    /// No handshake is performed. Used by tests.
    pub async fn from_stream(
        stream: MailStream,
        host: impl Into<String>,
        local_hostname: impl Into<String>,
    ) -> Result<Self> {
        let mut conn = Self {
            stream: TextStream::new(stream),
            capabilities: Capabilities::new(),
            host: host.into(),
            local_hostname: local_hostname.into(),
            tls: TlsSettings::default(),
            timeout: None,
            tls_active: false,
            open: true,
            closed_by_server: false,
            authenticated: false,
        };

        let greeting = conn.read_reply(1).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::command_failed(
                "greeting",
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }
        Ok(conn)
    }

    fn wrap(stream: MailStream, config: &ProtocolConfig) -> Self {
        let tls_active = stream.is_tls();
        let timeout = config.read_timeout();
        let mut text = TextStream::new(stream);
        text.set_timeout(timeout);

        Self {
            stream: text,
            capabilities: Capabilities::new(),
            host: config.host().to_string(),
            local_hostname: config.local_hostname().to_string(),
            tls: TlsSettings::from_config(config),
            timeout,
            tls_active,
            open: true,
            closed_by_server: false,
            authenticated: false,
        }
    }

    /// The server's advertised extensions.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
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

    async fn read_reply(&mut self, timeout_factor: u32) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let read = self
                .stream
                .read_line_extended(timeout_factor)
                .await
                .map_err(Error::from);
            let line = self.fail_on_transport(read)?;
            if line.is_empty() {
                continue;
            }
            let last = Reply::is_last_line(&line);
            lines.push(line);
            if last {
                break;
            }
        }
        let reply = Reply::parse(&lines)?;
        if reply.code == ReplyCode::SERVICE_UNAVAILABLE {
            // 421 closes the transmission channel.
            self.open = false;
            self.closed_by_server = true;
        }
        Ok(reply)
    }

    /// Sends one command line and reads the reply. No status checking.
    pub async fn command(&mut self, line: &str) -> Result<Reply> {
        if !self.is_open() {
            return Err(Error::Net(mailwire_net::Error::ConnectionLost(
                "connection is closed".to_string(),
            )));
        }
        let write = self.stream.write_line(line).await.map_err(Error::from);
        self.fail_on_transport(write)?;
        self.read_reply(1).await
    }

    async fn command_expect_success(&mut self, line: &str, verb: &str) -> Result<Reply> {
        let reply = self.command(line).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(Error::command_failed(
                verb,
                reply.code.as_u16(),
                reply.message_text(),
            ))
        }
    }

    /// EHLO, falling back to HELO on rejection unless `ehlo=false` forces
    /// HELO or the fallback is disabled by the server accepting EHLO.
    pub async fn handshake(&mut self, config: &ProtocolConfig) -> Result<()> {
        self.capabilities.clear();

        if config.get_bool("ehlo", true) {
            let line = format!("EHLO {}", self.local_hostname);
            let reply = self.command(&line).await?;
            if reply.is_success() {
                self.record_extensions(&reply);
                return Ok(());
            }
            tracing::debug!(code = reply.code.as_u16(), "EHLO rejected, trying HELO");
        }

        let line = format!("HELO {}", self.local_hostname);
        self.command_expect_success(&line, "HELO").await?;
        Ok(())
    }

    fn record_extensions(&mut self, reply: &Reply) {
        // The first line is the server greeting text.
        for line in reply.message.iter().skip(1) {
            let trimmed = line.trim();
            if let Some(mechs) = trimmed.strip_prefix("AUTH=") {
                // Legacy advertisement; feeds the same mechanism list.
                self.capabilities.add_mechanisms(mechs);
            } else if let Some(mechs) = trimmed
                .strip_prefix("AUTH ")
                .or_else(|| trimmed.strip_prefix("auth "))
            {
                self.capabilities.add_mechanisms(mechs);
            } else {
                self.capabilities.add_line(trimmed);
            }
        }
    }

    /// STARTTLS: upgrade on 220 and rebuild the stream. The caller must
    /// re-issue EHLO afterwards.
    pub async fn starttls(mut self) -> Result<Self> {
        let reply = self.command("STARTTLS").await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::command_failed(
                "STARTTLS",
                reply.code.as_u16(),
                reply.message_text(),
            ));
        }

        let Self {
            stream,
            host,
            local_hostname,
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

        Ok(Self {
            stream,
            capabilities: Capabilities::new(),
            host,
            local_hostname,
            tls,
            timeout,
            tls_active: true,
            open,
            closed_by_server,
            authenticated,
        })
    }

    /// AUTH via the SASL mechanisms, candidates in policy order.
    pub async fn auth(
        &mut self,
        credentials: &Credentials,
        allowed: Option<&[String]>,
        realm: Option<&str>,
    ) -> Result<()> {
        let advertised = self.capabilities.mechanisms();
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
                    protocol: "smtp",
                    host: self.host.as_str(),
                    realm,
                };
                mailwire_sasl::try_create(mechanism, &ctx)
            };
            let Ok(mut auth) = created else { continue };

            tracing::debug!(mechanism, "attempting AUTH");
            match self.auth_exchange(auth.as_mut()).await? {
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

        let mut reply = self.command(&command).await?;

        while reply.code == ReplyCode::AUTH_CONTINUE {
            let challenge = reply
                .message
                .first()
                .map(|m| BASE64.decode(m.trim()).unwrap_or_default())
                .unwrap_or_default();

            match auth.evaluate_challenge(&challenge) {
                Ok(response) => {
                    reply = self.command(&BASE64.encode(response)).await?;
                }
                Err(err) => {
                    // "*" cancels the exchange.
                    let _ = self.command("*").await?;
                    return Err(Error::Auth(err.to_string()));
                }
            }
        }

        if reply.is_success() {
            Ok(None)
        } else {
            Ok(Some(format!(
                "{} rejected with {}: {}",
                auth.mechanism(),
                reply.code,
                reply.message_text()
            )))
        }
    }

    /// RSET: clears any partial mail transaction.
    pub async fn rset(&mut self) -> Result<()> {
        self.command_expect_success("RSET", "RSET").await?;
        Ok(())
    }

    /// QUIT. The reply is awaited iff `quitwait` (default true).
    pub async fn quit(&mut self, quitwait: bool) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let write = self.stream.write_line("QUIT").await.map_err(Error::from);
        let result = self.fail_on_transport(write);
        self.open = false;
        result?;

        if quitwait {
            match self.read_reply(1).await {
                Ok(_) | Err(Error::Net(mailwire_net::Error::UnexpectedEof)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SmtpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConnection")
            .field("host", &self.host)
            .field("open", &self.open)
            .field("authenticated", &self.authenticated)
            .finish_non_exhaustive()
    }
}

/// The message transport: connection lifecycle plus the per-message send
/// sequence.
pub struct Transport {
    config: ProtocolConfig,
    factory: Option<std::sync::Arc<dyn mailwire_net::StreamFactory>>,
    conn: Option<SmtpConnection>,
}

impl Transport {
    /// Creates a disconnected transport.
    #[must_use]
    pub const fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            factory: None,
            conn: None,
        }
    }

    /// Creates a transport whose connections go through a caller-supplied
    /// stream factory.
    #[must_use]
    pub fn with_factory(
        config: ProtocolConfig,
        factory: Option<std::sync::Arc<dyn mailwire_net::StreamFactory>>,
    ) -> Self {
        Self {
            config,
            factory,
            conn: None,
        }
    }

    /// Creates a transport over an already-connected engine. Used by
    /// tests.
    #[must_use]
    pub const fn from_connection(config: ProtocolConfig, conn: SmtpConnection) -> Self {
        Self {
            config,
            factory: None,
            conn: Some(conn),
        }
    }

    /// Connects, handshakes, and authenticates when `auth=true` or a
    /// username is given.
    pub async fn connect(&mut self, username: &str, password: &str) -> Result<()> {
        let mut conn =
            SmtpConnection::connect_with(&self.config, self.factory.as_ref()).await?;

        let want_auth = self.config.get_bool("auth", false) || !username.is_empty();
        if want_auth {
            if username.is_empty() {
                return Err(Error::Auth(
                    "authentication required but no credentials given".to_string(),
                ));
            }
            let mut credentials = Credentials::new(username, password);
            credentials.authzid = self
                .config
                .get("sasl.authorizationid")
                .map(str::to_string);
            let allowed: Option<Vec<String>> = self.config.get("sasl.mechanisms").map(|list| {
                list.split_whitespace().map(str::to_uppercase).collect()
            });
            conn.auth(
                &credentials,
                allowed.as_deref(),
                self.config.get("sasl.realm"),
            )
            .await?;
        }

        self.conn = Some(conn);
        Ok(())
    }

    /// Returns true while the transport holds a usable connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(SmtpConnection::is_open)
    }

    /// Sends one message to the given recipients.
    ///
    /// Per-recipient rejections never abort the send; the returned
    /// vector has one entry per recipient in offer order. The send as a
    /// whole fails only on transport errors, a rejected MAIL FROM/DATA,
    /// or when every recipient was rejected (the transaction is then
    /// reset). A failed send carries the partial status vector.
    pub async fn send_message(
        &mut self,
        message: &mut dyn MimeMessage,
        from: Option<&Address>,
        recipients: &[Address],
    ) -> std::result::Result<Vec<SendStatus>, SendError> {
        let mut statuses = Vec::with_capacity(recipients.len());
        match self.send_inner(message, from, recipients, &mut statuses).await {
            Ok(()) => Ok(statuses),
            Err(source) => Err(SendError {
                partial: statuses,
                source,
            }),
        }
    }

    async fn send_inner(
        &mut self,
        message: &mut dyn MimeMessage,
        from: Option<&Address>,
        recipients: &[Address],
        statuses: &mut Vec<SendStatus>,
    ) -> Result<()> {
        if recipients.is_empty() {
            return Err(Error::InvalidAddress("no recipients".to_string()));
        }

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::InvalidState("transport is not connected".to_string()))?;

        // 8BITMIME: when allowed and advertised, convert qualifying parts
        // and send the BODY parameter whether or not anything converted.
        let eight_bit = self.config.get_bool("allow8bitmime", false)
            && conn.capabilities.contains("8BITMIME");
        if eight_bit {
            let converted = crate::eightbit::convert_to_8bit(message);
            tracing::debug!(converted, "8BITMIME conversion pass");
        }

        let data = message.write_to().map_err(Error::Protocol)?;

        // MAIL FROM with its trailing parameters.
        let sender = match from {
            Some(addr) => addr.clone(),
            None => {
                let configured = self
                    .config
                    .get("from")
                    .ok_or_else(|| Error::InvalidAddress("no sender address".to_string()))?;
                Address::new(configured)?
            }
        };

        let mut mail_from = format!("MAIL FROM:<{sender}>");
        if eight_bit {
            mail_from.push_str(" BODY=8BITMIME");
        }
        if conn.capabilities.contains("SIZE") {
            mail_from.push_str(&format!(" SIZE={}", dot_stuffed_len(&data)));
        }
        if conn.capabilities.contains("DSN") {
            if let Some(ret) = self.config.get("dsn.ret") {
                mail_from.push_str(&format!(" RET={ret}"));
            }
        }
        if conn.capabilities.contains("AUTH") || conn.capabilities.contains("SUBMITTER") {
            if let Some(submitter) = self.config.get("submitter") {
                mail_from.push_str(&format!(" AUTH={}", xtext_encode(submitter)));
            }
        }
        if let Some(extension) = self.config.get("mailextension") {
            mail_from.push(' ');
            mail_from.push_str(extension);
        }

        conn.command_expect_success(&mail_from, "MAIL FROM").await?;

        // RCPT TO per recipient; failures are recorded, not raised.
        let notify = self
            .config
            .get("dsn.notify")
            .filter(|_| conn.capabilities.contains("DSN"))
            .map(str::to_string);

        let report_success = self.config.get_bool("reportsuccess", false);
        let mut accepted = 0u32;
        for recipient in recipients {
            let mut line = format!("RCPT TO:<{recipient}>");
            if let Some(notify) = &notify {
                line.push_str(&format!(" NOTIFY={notify}"));
            }

            let reply = conn.command(&line).await?;
            let result = SendResult::from_code(reply.code.as_u16());
            match result {
                SendResult::Success => {
                    accepted += 1;
                    if report_success {
                        tracing::info!(target: "mailwire::smtp::event",
                            address = %recipient, "recipient accepted");
                    }
                }
                _ => {
                    tracing::info!(target: "mailwire::smtp::event",
                        address = %recipient, code = reply.code.as_u16(),
                        "recipient rejected");
                }
            }
            statuses.push(SendStatus {
                result,
                address: recipient.clone(),
                command: line,
                reply,
            });
        }

        if accepted == 0 {
            // Nothing to deliver to; reset the transaction for reuse.
            conn.rset().await?;
            return Err(Error::InvalidAddress(
                "all recipients were rejected".to_string(),
            ));
        }

        // DATA: 354, dot-stuffed payload, terminator, final 250. The
        // final reply gets twice the normal deadline.
        let reply = conn.command("DATA").await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::command_failed(
                "DATA",
                reply.code.as_u16(),
                reply.message_text(),
            ));
        }

        let write = conn
            .stream
            .write_dot_stuffed(&data)
            .await
            .map_err(Error::from);
        conn.fail_on_transport(write)?;

        let final_reply = conn.read_reply(2).await?;
        if !final_reply.is_success() {
            return Err(Error::command_failed(
                "DATA",
                final_reply.code.as_u16(),
                final_reply.message_text(),
            ));
        }

        Ok(())
    }

    /// Resets the server-side transaction state.
    pub async fn reset(&mut self) -> Result<()> {
        match self.conn.as_mut() {
            Some(conn) => conn.rset().await,
            None => Ok(()),
        }
    }

    /// Closes the transport, awaiting the QUIT reply iff `quitwait`
    /// (default true).
    pub async fn close(&mut self) -> Result<()> {
        let quitwait = self.config.get_bool("quitwait", true);
        if let Some(mut conn) = self.conn.take() {
            conn.quit(quitwait).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("host", &self.config.host())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Encodes an xtext value (RFC 3461 §4): `+` and characters outside
/// 0x21..=0x7E become `+XX` hex escapes.
fn xtext_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if (0x21..=0x7E).contains(&b) && b != b'+' && b != b'=' {
            out.push(b as char);
        } else {
            out.push_str(&format!("+{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xtext_encode() {
        assert_eq!(xtext_encode("user@example.com"), "user@example.com");
        assert_eq!(xtext_encode("a+b"), "a+2Bb");
        assert_eq!(xtext_encode("a=b"), "a+3Db");
        assert_eq!(xtext_encode("sp ace"), "sp+20ace");
    }
}
