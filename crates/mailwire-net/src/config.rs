//! Protocol configuration view.
//!
//! A session carries one flat, read-only property map. Each protocol engine
//! sees it through a [`ProtocolConfig`] scoped to its own
//! `mail.<protocol>.<key>` namespace. Unknown keys are ignored.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Read-only option view scoped to one protocol.
///
/// Shared by reference across every connection created from a session.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    protocol: String,
    props: Arc<BTreeMap<String, String>>,
    default_port: u16,
}

impl ProtocolConfig {
    /// Creates a view over `props` scoped to `protocol` (e.g. `"pop3"`).
    #[must_use]
    pub fn new(protocol: impl Into<String>, props: Arc<BTreeMap<String, String>>) -> Self {
        Self {
            protocol: protocol.into(),
            props,
            default_port: 0,
        }
    }

    /// Sets the port used when the `port` option is absent. The session
    /// derives it from the protocol and `ssl.enable`.
    #[must_use]
    pub const fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// The configured default port.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Creates an empty configuration, useful for tests and defaults.
    #[must_use]
    pub fn empty(protocol: impl Into<String>) -> Self {
        Self::new(protocol, Arc::new(BTreeMap::new()))
    }

    /// Returns the protocol name this view is scoped to.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Looks up `mail.<protocol>.<key>`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let full = format!("mail.{}.{}", self.protocol, key);
        self.props.get(&full).map(String::as_str)
    }

    /// Looks up a string option with a default.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Looks up a boolean option. Only the literal `true` enables it.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).map_or(default, |v| v == "true")
    }

    /// Looks up an integer option, falling back on parse failure.
    #[must_use]
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Looks up a millisecond duration option. Absent or non-positive
    /// values mean no deadline.
    #[must_use]
    pub fn get_duration_ms(&self, key: &str) -> Option<Duration> {
        let ms = self.get(key)?.parse::<u64>().ok()?;
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    /// Server host (`host` option, default `localhost`).
    #[must_use]
    pub fn host(&self) -> &str {
        self.get_or("host", "localhost")
    }

    /// Server port, with the caller supplying the per-protocol default.
    #[must_use]
    pub fn port(&self, default: u16) -> u16 {
        self.get("port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Server port, falling back to [`Self::default_port`].
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port(self.default_port)
    }

    /// Client host name announced in HELO/EHLO (`localhost` option).
    #[must_use]
    pub fn local_hostname(&self) -> &str {
        self.get_or("localhost", "localhost")
    }

    /// Socket read deadline (`timeout` option, milliseconds).
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.get_duration_ms("timeout")
    }

    /// Connect deadline (`connectiontimeout` option, default 30 seconds).
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.get_duration_ms("connectiontimeout")
            .unwrap_or(Duration::from_secs(30))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(entries: &[(&str, &str)]) -> ProtocolConfig {
        let map: BTreeMap<String, String> = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ProtocolConfig::new("pop3", Arc::new(map))
    }

    #[test]
    fn test_scoped_lookup() {
        let cfg = config(&[
            ("mail.pop3.host", "pop.example.com"),
            ("mail.imap.host", "imap.example.com"),
        ]);
        assert_eq!(cfg.get("host"), Some("pop.example.com"));
        assert_eq!(cfg.host(), "pop.example.com");
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.host(), "localhost");
        assert_eq!(cfg.port(110), 110);
        assert!(!cfg.get_bool("ssl.enable", false));
        assert!(cfg.read_timeout().is_none());
    }

    #[test]
    fn test_bool_requires_literal_true() {
        let cfg = config(&[
            ("mail.pop3.ssl.enable", "true"),
            ("mail.pop3.apop.enable", "yes"),
        ]);
        assert!(cfg.get_bool("ssl.enable", false));
        assert!(!cfg.get_bool("apop.enable", false));
    }

    #[test]
    fn test_timeout_parse() {
        let cfg = config(&[("mail.pop3.timeout", "1500")]);
        assert_eq!(cfg.read_timeout(), Some(Duration::from_millis(1500)));

        let cfg = config(&[("mail.pop3.timeout", "0")]);
        assert!(cfg.read_timeout().is_none());
    }

    #[test]
    fn test_port_override() {
        let cfg = config(&[("mail.pop3.port", "2110")]);
        assert_eq!(cfg.port(110), 2110);
    }
}
