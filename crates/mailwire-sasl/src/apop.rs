//! APOP digest (RFC 1939 §7).
//!
//! APOP is not a challenge/response mechanism: the POP3 greeting carries a
//! timestamp `<...@...>` and the client answers with one command,
//! `APOP user HEX(MD5(timestamp || password))`.

use crate::cram_md5::hex;

/// Computes the APOP digest for a greeting timestamp and shared secret.
#[must_use]
pub fn digest(timestamp: &str, secret: &str) -> String {
    hex(&md5::compute(format!("{timestamp}{secret}")).0)
}

/// Extracts the `<...@...>` timestamp from a POP3 greeting, if present.
#[must_use]
pub fn greeting_timestamp(greeting: &str) -> Option<&str> {
    let start = greeting.find('<')?;
    let end = greeting[start..].find('>')? + start;
    let stamp = &greeting[start..=end];
    stamp.contains('@').then_some(stamp)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1939_vector() {
        // RFC 1939 §7: secret "tanstaaf".
        assert_eq!(
            digest("<1896.697170952@dbc.mtview.ca.us>", "tanstaaf"),
            "c4c9334bac560ecc979e58001b3e22fb"
        );
    }

    #[test]
    fn test_greeting_timestamp() {
        assert_eq!(
            greeting_timestamp("+OK POP3 ready <1896.697170952@server>"),
            Some("<1896.697170952@server>")
        );
        assert_eq!(greeting_timestamp("+OK POP3 ready"), None);
        assert_eq!(greeting_timestamp("+OK <notimestamp>"), None);
    }
}
