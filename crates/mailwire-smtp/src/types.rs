//! SMTP value types: replies, addresses, per-recipient send status.

use crate::{Error, Result};

/// SMTP reply from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g. 250).
    pub code: ReplyCode,
    /// Reply message lines, code stripped.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    pub const fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Parses accumulated reply lines (`250-...` continuations plus the
    /// `250 ...` terminator).
    pub fn parse(lines: &[String]) -> Result<Self> {
        let first = lines
            .first()
            .ok_or_else(|| Error::Protocol("empty reply".to_string()))?;
        if first.len() < 3 {
            return Err(Error::Protocol(format!("reply too short: {first}")));
        }

        let code = first[0..3]
            .parse::<u16>()
            .map_err(|_| Error::Protocol(format!("invalid reply code: {first}")))?;

        let mut message = Vec::with_capacity(lines.len());
        for line in lines {
            if line.len() > 4 {
                message.push(line[4..].to_string());
            } else {
                message.push(String::new());
            }
        }

        Ok(Self::new(ReplyCode::new(code), message))
    }

    /// True for the terminating line of a reply (`250 ` not `250-`).
    #[must_use]
    pub fn is_last_line(line: &str) -> bool {
        line.len() < 4 || line.as_bytes()[3] == b' '
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Reply codes the engine branches on.
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
}

/// Email address for the SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] when the address has no `@`, an
    /// empty side, or control characters.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("address is empty".to_string()));
        }
        if addr.bytes().any(|b| b < 0x21 || b == b'<' || b == b'>') {
            return Err(Error::InvalidAddress(format!(
                "address contains forbidden characters: {addr}"
            )));
        }
        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress(format!("no @ in {addr}")));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Error::InvalidAddress(format!("malformed address: {addr}")));
        }
        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome category of one RCPT TO exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Recipient accepted (250/251).
    Success,
    /// Recipient rejected as invalid (500/501/503/550/551).
    InvalidAddress,
    /// Delivery refused for a transient or capacity reason
    /// (421/450/451/452/552).
    SendFailure,
    /// Anything else.
    GeneralError,
}

impl SendResult {
    /// Categorises an RCPT reply code.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            250 | 251 => Self::Success,
            500 | 501 | 503 | 550 | 551 => Self::InvalidAddress,
            421 | 450 | 451 | 452 | 552 => Self::SendFailure,
            _ => Self::GeneralError,
        }
    }
}

/// Per-recipient delivery status, one entry per RCPT TO in offer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendStatus {
    /// The outcome category.
    pub result: SendResult,
    /// The recipient address.
    pub address: Address,
    /// The command as sent (without CRLF).
    pub command: String,
    /// The server's reply.
    pub reply: Reply,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line_reply() {
        let reply = Reply::parse(&["250 OK".to_string()]).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let lines = vec![
            "250-mail.example.com".to_string(),
            "250-SIZE 52428800".to_string(),
            "250 8BITMIME".to_string(),
        ];
        let reply = Reply::parse(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message[1], "SIZE 52428800");
    }

    #[test]
    fn test_is_last_line() {
        assert!(Reply::is_last_line("250 OK"));
        assert!(!Reply::is_last_line("250-Continuing"));
        assert!(Reply::is_last_line("250"));
    }

    #[test]
    fn test_parse_bad_replies() {
        assert!(Reply::parse(&[]).is_err());
        assert!(Reply::parse(&["25".to_string()]).is_err());
        assert!(Reply::parse(&["ABC OK".to_string()]).is_err());
    }

    #[test]
    fn test_address_validation() {
        assert!(Address::new("user@example.com").is_ok());
        assert!(Address::new("userexample.com").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
        assert!(Address::new("a b@example.com").is_err());
        assert!(Address::new("").is_err());
    }

    #[test]
    fn test_send_result_categories() {
        assert_eq!(SendResult::from_code(250), SendResult::Success);
        assert_eq!(SendResult::from_code(251), SendResult::Success);
        assert_eq!(SendResult::from_code(550), SendResult::InvalidAddress);
        assert_eq!(SendResult::from_code(501), SendResult::InvalidAddress);
        assert_eq!(SendResult::from_code(452), SendResult::SendFailure);
        assert_eq!(SendResult::from_code(421), SendResult::SendFailure);
        assert_eq!(SendResult::from_code(554), SendResult::GeneralError);
    }
}
