//! LOGIN mechanism (legacy two-step).

use crate::{Authenticator, Error, Result};

enum Step {
    Username,
    Password,
    Done,
}

/// LOGIN: the server prompts `Username:` then `Password:`; the prompt text
/// is ignored, only the step order matters.
pub struct Login {
    username: String,
    password: String,
    step: Step,
}

impl Login {
    /// Creates a LOGIN exchange.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            step: Step::Username,
        }
    }
}

impl Authenticator for Login {
    fn mechanism(&self) -> &'static str {
        "LOGIN"
    }

    fn has_initial_response(&self) -> bool {
        false
    }

    fn is_complete(&self) -> bool {
        matches!(self.step, Step::Done)
    }

    fn evaluate_challenge(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        match self.step {
            Step::Username => {
                self.step = Step::Password;
                Ok(self.username.clone().into_bytes())
            }
            Step::Password => {
                self.step = Step::Done;
                Ok(self.password.clone().into_bytes())
            }
            Step::Done => Err(Error::AlreadyComplete),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_two_steps() {
        let mut auth = Login::new("user", "secret");
        assert!(!auth.has_initial_response());

        assert_eq!(auth.evaluate_challenge(b"Username:").unwrap(), b"user");
        assert!(!auth.is_complete());

        assert_eq!(auth.evaluate_challenge(b"Password:").unwrap(), b"secret");
        assert!(auth.is_complete());
    }
}
