//! The session: one property map, many protocol endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use mailwire_net::ProtocolConfig;

/// A mail session.
///
/// Holds the flat `mail.<protocol>.<key>` property map and hands out
/// per-protocol views of it, plus store and transport instances bound to
/// those views. Unknown keys are ignored by every consumer.
#[derive(Debug, Clone)]
pub struct Session {
    props: Arc<BTreeMap<String, String>>,
}

impl Session {
    /// Creates a session over the given properties.
    #[must_use]
    pub fn new(props: BTreeMap<String, String>) -> Self {
        Self {
            props: Arc::new(props),
        }
    }

    /// The scoped configuration for one protocol, with its default port
    /// resolved from `ssl.enable`.
    #[must_use]
    pub fn config(&self, protocol: &str) -> ProtocolConfig {
        let config = ProtocolConfig::new(protocol, Arc::clone(&self.props));
        let ssl = config.get_bool("ssl.enable", false);

        let default_port = match (protocol, ssl) {
            ("pop3", false) => 110,
            ("pop3", true) => 995,
            ("imap", false) => 143,
            ("imap", true) => 993,
            ("smtp", false) => 25,
            ("smtp", true) => 465,
            ("nntp", false) => 119,
            ("nntp", true) => 563,
            _ => 0,
        };
        config.with_default_port(default_port)
    }

    /// An IMAP message store bound to this session's configuration.
    #[must_use]
    pub fn imap_store(&self) -> mailwire_imap::Store {
        mailwire_imap::Store::new(self.config("imap"))
    }

    /// A POP3 message store bound to this session's configuration.
    #[must_use]
    pub fn pop3_store(&self) -> mailwire_pop3::Store {
        mailwire_pop3::Store::new(self.config("pop3"))
    }

    /// An SMTP transport bound to this session's configuration.
    #[must_use]
    pub fn smtp_transport(&self) -> mailwire_smtp::Transport {
        mailwire_smtp::Transport::new(self.config("smtp"))
    }

    /// Connects an NNTP transport per this session's configuration.
    ///
    /// # Errors
    ///
    /// Returns the engine's connect error when the welcome fails.
    pub async fn nntp_transport(&self) -> mailwire_nntp::Result<mailwire_nntp::NntpConnection> {
        mailwire_nntp::NntpConnection::connect(&self.config("nntp")).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(entries: &[(&str, &str)]) -> Session {
        Session::new(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_default_ports_follow_ssl() {
        let plain = session(&[]);
        assert_eq!(plain.config("pop3").effective_port(), 110);
        assert_eq!(plain.config("imap").effective_port(), 143);
        assert_eq!(plain.config("smtp").effective_port(), 25);
        assert_eq!(plain.config("nntp").effective_port(), 119);

        let tls = session(&[
            ("mail.pop3.ssl.enable", "true"),
            ("mail.imap.ssl.enable", "true"),
            ("mail.smtp.ssl.enable", "true"),
            ("mail.nntp.ssl.enable", "true"),
        ]);
        assert_eq!(tls.config("pop3").effective_port(), 995);
        assert_eq!(tls.config("imap").effective_port(), 993);
        assert_eq!(tls.config("smtp").effective_port(), 465);
        assert_eq!(tls.config("nntp").effective_port(), 563);
    }

    #[test]
    fn test_explicit_port_wins() {
        let s = session(&[("mail.imap.port", "10143")]);
        assert_eq!(s.config("imap").effective_port(), 10_143);
    }

    #[test]
    fn test_scoping() {
        let s = session(&[
            ("mail.imap.host", "imap.example.com"),
            ("mail.smtp.host", "smtp.example.com"),
        ]);
        assert_eq!(s.config("imap").host(), "imap.example.com");
        assert_eq!(s.config("smtp").host(), "smtp.example.com");
        assert_eq!(s.config("pop3").host(), "localhost");
    }
}
