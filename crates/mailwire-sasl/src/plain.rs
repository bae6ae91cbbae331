//! PLAIN mechanism (RFC 4616).

use crate::{Authenticator, Error, Result};

/// PLAIN: `authzid NUL user NUL password`, UTF-8.
#[derive(Debug)]
pub struct Plain {
    authzid: String,
    username: String,
    password: String,
    complete: bool,
}

impl Plain {
    /// Creates a PLAIN exchange. An empty `authzid` is sent as-is, which
    /// servers treat as "derive from the user name".
    #[must_use]
    pub fn new(
        authzid: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            authzid: authzid.into(),
            username: username.into(),
            password: password.into(),
            complete: false,
        }
    }
}

impl Authenticator for Plain {
    fn mechanism(&self) -> &'static str {
        "PLAIN"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn evaluate_challenge(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        if self.complete {
            return Err(Error::AlreadyComplete);
        }
        self.complete = true;

        let mut out = Vec::new();
        out.extend_from_slice(self.authzid.as_bytes());
        out.push(0);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.extend_from_slice(self.password.as_bytes());
        Ok(out)
    }
}
