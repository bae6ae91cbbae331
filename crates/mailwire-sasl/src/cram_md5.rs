//! CRAM-MD5 mechanism (RFC 2195).

use crate::{Authenticator, Error, Result};

/// CRAM-MD5: HMAC-MD5 of the server challenge keyed by the password,
/// hex-encoded and prefixed with `user `.
pub struct CramMd5 {
    username: String,
    password: String,
    complete: bool,
}

impl CramMd5 {
    /// Creates a CRAM-MD5 exchange.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            complete: false,
        }
    }
}

impl Authenticator for CramMd5 {
    fn mechanism(&self) -> &'static str {
        "CRAM-MD5"
    }

    fn has_initial_response(&self) -> bool {
        false
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        if self.complete {
            return Err(Error::AlreadyComplete);
        }
        self.complete = true;

        let digest = hmac_md5(self.password.as_bytes(), challenge);
        let mut out = self.username.clone().into_bytes();
        out.push(b' ');
        out.extend_from_slice(hex(&digest).as_bytes());
        Ok(out)
    }
}

/// HMAC-MD5 (RFC 2104) with a 64-byte block, over the `md5` crate.
pub(crate) fn hmac_md5(key: &[u8], message: &[u8]) -> [u8; 16] {
    const BLOCK: usize = 64;

    let mut key_block = [0u8; BLOCK];
    if key.len() > BLOCK {
        key_block[..16].copy_from_slice(&md5::compute(key).0);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Vec::with_capacity(BLOCK + message.len());
    let mut outer = Vec::with_capacity(BLOCK + 16);
    for &b in &key_block {
        inner.push(b ^ 0x36);
    }
    for &b in &key_block {
        outer.push(b ^ 0x5c);
    }
    inner.extend_from_slice(message);
    outer.extend_from_slice(&md5::compute(&inner).0);

    md5::compute(&outer).0
}

/// Lowercase hex encoding of a digest.
pub(crate) fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_md5_rfc2104_vector() {
        // RFC 2104 test case 2: key "Jefe", data "what do ya want for nothing?"
        let mac = hmac_md5(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(hex(&mac), "750c783e6ab0b503eaa86e310a5db738");
    }

    #[test]
    fn test_cram_md5_rfc2195_vector() {
        // RFC 2195 example: user "tim", password "tanstaaftanstaaf".
        let mut auth = CramMd5::new("tim", "tanstaaftanstaaf");
        let response = auth
            .evaluate_challenge(b"<1896.697170952@postoffice.reston.mci.net>")
            .unwrap();
        assert_eq!(
            response,
            b"tim b913a602c7eda7a495b4e6e7334d3890".as_slice()
        );
        assert!(auth.is_complete());
    }
}
