//! Server capabilities.

/// A capability advertised in a CAPABILITY response.
///
/// The tokenizer keeps `=` inside atoms, so `AUTH=PLAIN` arrives as one
/// atom and parses into [`Capability::Auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// IMAP4rev1 base protocol.
    Imap4Rev1,
    /// STARTTLS upgrade support.
    StartTls,
    /// LOGIN command is disabled (pre-TLS).
    LoginDisabled,
    /// An AUTH=<mechanism> entry.
    Auth(String),
    /// IDLE (RFC 2177).
    Idle,
    /// NAMESPACE (RFC 2342).
    Namespace,
    /// QUOTA (RFC 2087).
    Quota,
    /// ACL (RFC 4314).
    Acl,
    /// UIDPLUS (RFC 4315).
    UidPlus,
    /// LITERAL+ (RFC 7888).
    LiteralPlus,
    /// Children attributes on LIST.
    Children,
    /// Any other capability atom.
    Other(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "IDLE" => Self::Idle,
            "NAMESPACE" => Self::Namespace,
            "QUOTA" => Self::Quota,
            "ACL" => Self::Acl,
            "UIDPLUS" => Self::UidPlus,
            "LITERAL+" => Self::LiteralPlus,
            "CHILDREN" => Self::Children,
            _ => upper.strip_prefix("AUTH=").map_or_else(
                || Self::Other(upper.clone()),
                |mech| Self::Auth(mech.to_string()),
            ),
        }
    }

    /// Renders the capability atom.
    #[must_use]
    pub fn as_atom(&self) -> String {
        match self {
            Self::Imap4Rev1 => "IMAP4REV1".to_string(),
            Self::StartTls => "STARTTLS".to_string(),
            Self::LoginDisabled => "LOGINDISABLED".to_string(),
            Self::Auth(mech) => format!("AUTH={mech}"),
            Self::Idle => "IDLE".to_string(),
            Self::Namespace => "NAMESPACE".to_string(),
            Self::Quota => "QUOTA".to_string(),
            Self::Acl => "ACL".to_string(),
            Self::UidPlus => "UIDPLUS".to_string(),
            Self::LiteralPlus => "LITERAL+".to_string(),
            Self::Children => "CHILDREN".to_string(),
            Self::Other(s) => s.clone(),
        }
    }
}

/// Extracts the advertised AUTH mechanism names, in order.
#[must_use]
pub fn auth_mechanisms(capabilities: &[Capability]) -> Vec<String> {
    capabilities
        .iter()
        .filter_map(|c| match c {
            Capability::Auth(mech) => Some(mech.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base() {
        assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("STARTTLS"), Capability::StartTls);
        assert_eq!(Capability::parse("idle"), Capability::Idle);
    }

    #[test]
    fn test_parse_auth() {
        assert_eq!(
            Capability::parse("AUTH=PLAIN"),
            Capability::Auth("PLAIN".to_string())
        );
        assert_eq!(
            Capability::parse("auth=cram-md5"),
            Capability::Auth("CRAM-MD5".to_string())
        );
    }

    #[test]
    fn test_roundtrip_atom() {
        for atom in ["IMAP4REV1", "AUTH=PLAIN", "LITERAL+", "XLIST"] {
            assert_eq!(Capability::parse(atom).as_atom(), atom);
        }
    }

    #[test]
    fn test_auth_mechanisms_ordered() {
        let caps = vec![
            Capability::Imap4Rev1,
            Capability::Auth("CRAM-MD5".to_string()),
            Capability::Auth("PLAIN".to_string()),
        ];
        assert_eq!(auth_mechanisms(&caps), vec!["CRAM-MD5", "PLAIN"]);
    }
}
