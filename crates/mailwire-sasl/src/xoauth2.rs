//! XOAUTH2 mechanism (Google/Microsoft OAuth 2.0 bearer tokens).

use crate::{Authenticator, Result};

enum Step {
    Initial,
    ErrorAck,
    Done,
}

/// XOAUTH2: `user=<u>\x01auth=Bearer <token>\x01\x01`, UTF-8.
///
/// On failure the server sends a JSON error blob as a challenge; the
/// client acknowledges with an empty message and the server then fails
/// the command.
pub struct XOAuth2 {
    username: String,
    token: String,
    step: Step,
}

impl XOAuth2 {
    /// Creates an XOAUTH2 exchange with a bearer access token.
    #[must_use]
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
            step: Step::Initial,
        }
    }
}

impl Authenticator for XOAuth2 {
    fn mechanism(&self) -> &'static str {
        "XOAUTH2"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn is_complete(&self) -> bool {
        matches!(self.step, Step::Done)
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        match self.step {
            Step::Initial => {
                self.step = Step::ErrorAck;
                Ok(format!(
                    "user={}\x01auth=Bearer {}\x01\x01",
                    self.username, self.token
                )
                .into_bytes())
            }
            Step::ErrorAck | Step::Done => {
                if !challenge.is_empty() {
                    tracing::debug!(
                        error = %String::from_utf8_lossy(challenge),
                        "XOAUTH2 error challenge"
                    );
                }
                self.step = Step::Done;
                Ok(Vec::new())
            }
        }
    }
}
