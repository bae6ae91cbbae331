//! DIGEST-MD5 mechanism (RFC 2831).

use std::collections::HashMap;

use rand::RngCore;

use crate::cram_md5::hex;
use crate::{Authenticator, Error, Result};

enum Step {
    Initial,
    RspAuth { expected: String },
    Done,
}

/// DIGEST-MD5 with `qop=auth`, `nc=00000001`, and a `digest-uri` of
/// `<protocol>/<host>`. The second server challenge carries `rspauth`,
/// which is verified before the exchange completes.
pub struct DigestMd5 {
    username: String,
    password: String,
    authzid: Option<String>,
    realm: Option<String>,
    protocol: String,
    host: String,
    cnonce: String,
    step: Step,
}

impl DigestMd5 {
    /// Creates a DIGEST-MD5 exchange for `protocol` (e.g. `imap`) against
    /// `host`.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        protocol: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            username: username.into(),
            password: password.into(),
            authzid: None,
            realm: None,
            protocol: protocol.into(),
            host: host.into(),
            cnonce: hex(&bytes),
            step: Step::Initial,
        }
    }

    /// Sets the authorization id sent as `authzid`.
    #[must_use]
    pub fn with_authzid(mut self, authzid: impl Into<String>) -> Self {
        self.authzid = Some(authzid.into());
        self
    }

    /// Sets the realm, overriding whatever the server offers.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    #[cfg(test)]
    fn with_cnonce(mut self, cnonce: &str) -> Self {
        self.cnonce = cnonce.to_string();
        self
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let fields = parse_challenge(challenge)?;
        let nonce = fields
            .get("nonce")
            .ok_or_else(|| Error::MalformedChallenge("missing nonce".to_string()))?
            .clone();

        // The server may offer several realms; the configured one wins,
        // otherwise the first offered, otherwise the server host.
        let realm = self
            .realm
            .clone()
            .or_else(|| fields.get("realm").cloned())
            .unwrap_or_else(|| self.host.clone());

        let digest_uri = format!("{}/{}", self.protocol, self.host);
        let nc = "00000001";
        let qop = "auth";

        let secret = md5::compute(format!("{}:{realm}:{}", self.username, self.password)).0;
        let mut a1 = secret.to_vec();
        a1.extend_from_slice(format!(":{nonce}:{}", self.cnonce).as_bytes());
        if let Some(authzid) = &self.authzid {
            a1.extend_from_slice(format!(":{authzid}").as_bytes());
        }
        let ha1 = hex(&md5::compute(&a1).0);

        let ha2 = hex(&md5::compute(format!("AUTHENTICATE:{digest_uri}")).0);
        let response = hex(&md5::compute(format!(
            "{ha1}:{nonce}:{nc}:{}:{qop}:{ha2}",
            self.cnonce
        ))
        .0);

        let ha2_resp = hex(&md5::compute(format!(":{digest_uri}")).0);
        let expected = hex(&md5::compute(format!(
            "{ha1}:{nonce}:{nc}:{}:{qop}:{ha2_resp}",
            self.cnonce
        ))
        .0);
        self.step = Step::RspAuth { expected };

        let mut out = format!(
            "username=\"{}\",realm=\"{realm}\",nonce=\"{nonce}\",cnonce=\"{}\",nc={nc},qop={qop},digest-uri=\"{digest_uri}\",response={response}",
            self.username, self.cnonce
        );
        if fields.get("charset").is_some_and(|c| c == "utf-8") {
            out.push_str(",charset=utf-8");
        }
        if let Some(authzid) = &self.authzid {
            out.push_str(&format!(",authzid=\"{authzid}\""));
        }
        Ok(out.into_bytes())
    }

    fn verify(&mut self, challenge: &[u8], expected: &str) -> Result<Vec<u8>> {
        let fields = parse_challenge(challenge)?;
        let rspauth = fields
            .get("rspauth")
            .ok_or_else(|| Error::MalformedChallenge("missing rspauth".to_string()))?;
        if rspauth != expected {
            return Err(Error::ServerProof(format!(
                "rspauth mismatch: got {rspauth}"
            )));
        }
        self.step = Step::Done;
        Ok(Vec::new())
    }
}

impl Authenticator for DigestMd5 {
    fn mechanism(&self) -> &'static str {
        "DIGEST-MD5"
    }

    fn has_initial_response(&self) -> bool {
        false
    }

    fn is_complete(&self) -> bool {
        matches!(self.step, Step::Done)
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        match std::mem::replace(&mut self.step, Step::Done) {
            Step::Initial => {
                self.step = Step::Initial;
                self.respond(challenge)
            }
            Step::RspAuth { expected } => self.verify(challenge, &expected),
            Step::Done => Err(Error::AlreadyComplete),
        }
    }
}

/// Parses a comma-separated `key=value` challenge, unquoting values.
fn parse_challenge(challenge: &[u8]) -> Result<HashMap<String, String>> {
    let text = std::str::from_utf8(challenge)
        .map_err(|_| Error::MalformedChallenge("non-UTF-8 challenge".to_string()))?;

    let mut fields = HashMap::new();
    let mut rest = text;

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            return Err(Error::MalformedChallenge(format!("no '=' in {rest:?}")));
        };
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = &rest[eq + 1..];

        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let Some(end) = stripped.find('"') else {
                return Err(Error::MalformedChallenge("unterminated quote".to_string()));
            };
            value = stripped[..end].to_string();
            rest = stripped[end + 1..].trim_start_matches(',');
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = rest.get(end + 1..).unwrap_or("");
        }

        // First realm offered wins; other repeated keys keep the first too.
        fields.entry(key).or_insert(value);
    }

    Ok(fields)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge() {
        let fields = parse_challenge(
            b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",algorithm=md5-sess,charset=utf-8",
        )
        .unwrap();
        assert_eq!(fields["realm"], "elwood.innosoft.com");
        assert_eq!(fields["nonce"], "OA6MG9tEQGm2hh");
        assert_eq!(fields["algorithm"], "md5-sess");
    }

    #[test]
    fn test_rfc2831_example_exchange() {
        // The worked example from RFC 2831 section 4.
        let mut auth = DigestMd5::new("chris", "secret", "imap", "elwood.innosoft.com")
            .with_cnonce("OA6MHXh6VqTrRk");

        let response = auth
            .evaluate_challenge(
                b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",algorithm=md5-sess,charset=utf-8",
            )
            .unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.contains("username=\"chris\""));
        assert!(text.contains("digest-uri=\"imap/elwood.innosoft.com\""));
        assert!(text.contains("response=d388dad90d4bbd760a152321f2143af7"));
        assert!(!auth.is_complete());

        let fin = auth
            .evaluate_challenge(b"rspauth=ea40f60335c427b5527b84dbabcdfffd")
            .unwrap();
        assert!(fin.is_empty());
        assert!(auth.is_complete());
    }

    #[test]
    fn test_bad_rspauth_rejected() {
        let mut auth = DigestMd5::new("chris", "secret", "imap", "elwood.innosoft.com")
            .with_cnonce("OA6MHXh6VqTrRk");
        let _ = auth
            .evaluate_challenge(
                b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\"",
            )
            .unwrap();
        assert!(matches!(
            auth.evaluate_challenge(b"rspauth=0000000000000000"),
            Err(Error::ServerProof(_))
        ));
    }
}
