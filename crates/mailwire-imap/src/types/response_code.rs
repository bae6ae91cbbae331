//! Bracketed response codes (`OK [CODE args] text`).

use super::{Capability, Flag, SeqNum, Uid, UidValidity};

/// A response code carried inside `[...]` on a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: show the text to the user.
    Alert,
    /// PARSE: the server had trouble parsing a message header.
    Parse,
    /// READ-ONLY: the mailbox is open read-only.
    ReadOnly,
    /// READ-WRITE: the mailbox is open read-write.
    ReadWrite,
    /// TRYCREATE: the target mailbox does not exist but may be created.
    TryCreate,
    /// UIDNEXT: predicted next UID.
    UidNext(Uid),
    /// UIDVALIDITY: the mailbox UID validity value.
    UidValidity(UidValidity),
    /// UNSEEN: sequence number of the first unseen message.
    Unseen(SeqNum),
    /// PERMANENTFLAGS: flags the client may change permanently.
    PermanentFlags(Vec<Flag>),
    /// CAPABILITY: capabilities embedded in a greeting or completion.
    Capability(Vec<Capability>),
    /// Any other code, kept verbatim with its argument text.
    Unknown(String, String),
}

impl ResponseCode {
    /// Renders the bracketed wire form.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Alert => "[ALERT]".to_string(),
            Self::Parse => "[PARSE]".to_string(),
            Self::ReadOnly => "[READ-ONLY]".to_string(),
            Self::ReadWrite => "[READ-WRITE]".to_string(),
            Self::TryCreate => "[TRYCREATE]".to_string(),
            Self::UidNext(uid) => format!("[UIDNEXT {uid}]"),
            Self::UidValidity(v) => format!("[UIDVALIDITY {}]", v.get()),
            Self::Unseen(seq) => format!("[UNSEEN {seq}]"),
            Self::PermanentFlags(flags) => {
                let inner: Vec<&str> = flags.iter().map(Flag::as_str).collect();
                format!("[PERMANENTFLAGS ({})]", inner.join(" "))
            }
            Self::Capability(caps) => {
                let inner: Vec<String> = caps.iter().map(Capability::as_atom).collect();
                format!("[CAPABILITY {}]", inner.join(" "))
            }
            Self::Unknown(name, args) => {
                if args.is_empty() {
                    format!("[{name}]")
                } else {
                    format!("[{name} {args}]")
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_simple() {
        assert_eq!(ResponseCode::Alert.to_wire(), "[ALERT]");
        assert_eq!(ResponseCode::ReadWrite.to_wire(), "[READ-WRITE]");
    }

    #[test]
    fn test_to_wire_args() {
        let code = ResponseCode::UidValidity(UidValidity::new(3_857_529_045).unwrap());
        assert_eq!(code.to_wire(), "[UIDVALIDITY 3857529045]");

        let code = ResponseCode::PermanentFlags(vec![Flag::Deleted, Flag::Seen]);
        assert_eq!(code.to_wire(), "[PERMANENTFLAGS (\\Deleted \\Seen)]");
    }
}
