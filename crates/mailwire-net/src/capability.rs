//! Server capability map.

use std::collections::HashMap;

/// Capabilities advertised by a server after EHLO / CAPA / LIST EXTENSIONS.
///
/// Keys are UPPER-CASE capability names; the value is the trailing argument
/// string (empty when the capability has none). The map is cleared on every
/// re-handshake, in particular after a STARTTLS upgrade.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: HashMap<String, String>,
}

impl Capabilities {
    /// Creates an empty capability map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one capability line (`NAME [args...]`) into the map.
    pub fn add_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match trimmed.split_once(' ') {
            Some((name, args)) => self.insert(name, args.trim()),
            None => self.insert(trimmed, ""),
        }
    }

    /// Inserts a capability with its argument string.
    pub fn insert(&mut self, name: &str, args: &str) {
        self.entries.insert(name.to_uppercase(), args.to_string());
    }

    /// Returns true if the capability is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_uppercase())
    }

    /// Returns the argument string for a capability.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_uppercase()).map(String::as_str)
    }

    /// The advertised AUTH mechanism names, in advertisement order.
    #[must_use]
    pub fn mechanisms(&self) -> Vec<String> {
        self.get("AUTH")
            .map(|args| args.split_whitespace().map(str::to_uppercase).collect())
            .unwrap_or_default()
    }

    /// Appends mechanism names to the AUTH entry, preserving order.
    ///
    /// Some ESMTP servers advertise the legacy `AUTH=LOGIN` line alongside
    /// `AUTH`; both feed the same mechanism list.
    pub fn add_mechanisms(&mut self, names: &str) {
        let entry = self.entries.entry("AUTH".to_string()).or_default();
        for name in names.split_whitespace() {
            let upper = name.to_uppercase();
            if !entry.split_whitespace().any(|m| m == upper) {
                if !entry.is_empty() {
                    entry.push(' ');
                }
                entry.push_str(&upper);
            }
        }
    }

    /// Removes every entry. Called before each re-handshake.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns true if no capability has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_line_with_args() {
        let mut caps = Capabilities::new();
        caps.add_line("SIZE 52428800");
        caps.add_line("starttls");

        assert!(caps.contains("STARTTLS"));
        assert_eq!(caps.get("SIZE"), Some("52428800"));
        assert_eq!(caps.get("starttls"), Some(""));
    }

    #[test]
    fn test_mechanisms_order() {
        let mut caps = Capabilities::new();
        caps.add_line("AUTH CRAM-MD5 PLAIN login");
        assert_eq!(caps.mechanisms(), vec!["CRAM-MD5", "PLAIN", "LOGIN"]);
    }

    #[test]
    fn test_add_mechanisms_merges() {
        let mut caps = Capabilities::new();
        caps.add_line("AUTH PLAIN");
        caps.add_mechanisms("LOGIN PLAIN");
        assert_eq!(caps.mechanisms(), vec!["PLAIN", "LOGIN"]);
    }

    #[test]
    fn test_clear() {
        let mut caps = Capabilities::new();
        caps.add_line("PIPELINING");
        caps.clear();
        assert!(caps.is_empty());
        assert!(!caps.contains("PIPELINING"));
    }
}
