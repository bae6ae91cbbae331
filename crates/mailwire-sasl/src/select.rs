//! Mechanism selection policy.
//!
//! The effective mechanism list is the server-advertised list intersected
//! with the configured allow-list. XOAUTH2, when effective, is chosen
//! outright and bypasses the ranking; otherwise mechanisms are tried
//! strongest first: DIGEST-MD5, CRAM-MD5, LOGIN, PLAIN.

use crate::{
    Authenticator, CramMd5, CredentialCallback, DigestMd5, Error, Login, Plain, Result, XOAuth2,
};

/// Built-in mechanisms in selection priority order, strongest first.
pub const PRIORITY: [&str; 4] = ["DIGEST-MD5", "CRAM-MD5", "LOGIN", "PLAIN"];

/// Intersects the advertised mechanisms with the allow-list, preserving
/// advertisement order. `None` allows every built-in mechanism.
#[must_use]
pub fn effective(advertised: &[String], allowed: Option<&[String]>) -> Vec<String> {
    advertised
        .iter()
        .map(|m| m.to_uppercase())
        .filter(|m| {
            allowed.is_none_or(|list| list.iter().any(|a| a.eq_ignore_ascii_case(m)))
        })
        .collect()
}

/// Produces the ordered list of mechanisms to attempt.
///
/// The engines walk this list: a server rejection of one mechanism drops
/// to the next; exhausting the list is an authentication failure.
#[must_use]
pub fn ranked(advertised: &[String], allowed: Option<&[String]>) -> Vec<String> {
    let effective = effective(advertised, allowed);

    if effective.iter().any(|m| m == "XOAUTH2") {
        return vec!["XOAUTH2".to_string()];
    }

    PRIORITY
        .iter()
        .filter(|p| effective.iter().any(|m| m == *p))
        .map(|p| (*p).to_string())
        .collect()
}

/// Everything a mechanism needs at construction time.
pub struct MechanismContext<'a> {
    /// Credential source.
    pub credentials: &'a dyn CredentialCallback,
    /// Protocol name used in the DIGEST-MD5 digest-uri, e.g. `smtp`.
    pub protocol: &'a str,
    /// Server host used in the DIGEST-MD5 digest-uri.
    pub host: &'a str,
    /// Realm override (`sasl.realm`).
    pub realm: Option<&'a str>,
}

/// Instantiates a mechanism by name.
///
/// # Errors
///
/// Returns [`Error::UnsupportedMechanism`] for names with no built-in
/// implementation; the caller treats this as recoverable and drops to the
/// next candidate.
pub fn try_create(
    mechanism: &str,
    ctx: &MechanismContext<'_>,
) -> Result<Box<dyn Authenticator>> {
    let user = ctx.credentials.user();
    let password = ctx.credentials.password();

    match mechanism.to_uppercase().as_str() {
        "PLAIN" => Ok(Box::new(Plain::new(
            ctx.credentials.authzid(),
            user,
            password,
        ))),
        "LOGIN" => Ok(Box::new(Login::new(user, password))),
        "CRAM-MD5" => Ok(Box::new(CramMd5::new(user, password))),
        "DIGEST-MD5" => {
            let mut auth = DigestMd5::new(user, password, ctx.protocol, ctx.host);
            if let Some(realm) = ctx.realm {
                auth = auth.with_realm(realm);
            }
            Ok(Box::new(auth))
        }
        "XOAUTH2" => Ok(Box::new(XOAuth2::new(user, password))),
        other => Err(Error::UnsupportedMechanism(other.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Credentials;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_intersection_picks_plain() {
        // Server advertises CRAM-MD5 and PLAIN; only PLAIN and LOGIN are
        // allowed, so the intersection leaves PLAIN alone.
        let advertised = names(&["CRAM-MD5", "PLAIN"]);
        let allowed = names(&["PLAIN", "LOGIN"]);
        assert_eq!(ranked(&advertised, Some(&allowed)), vec!["PLAIN"]);
    }

    #[test]
    fn test_priority_order() {
        let advertised = names(&["PLAIN", "LOGIN", "CRAM-MD5", "DIGEST-MD5"]);
        assert_eq!(
            ranked(&advertised, None),
            vec!["DIGEST-MD5", "CRAM-MD5", "LOGIN", "PLAIN"]
        );
    }

    #[test]
    fn test_xoauth2_bypasses_ranking() {
        let advertised = names(&["PLAIN", "XOAUTH2", "CRAM-MD5"]);
        assert_eq!(ranked(&advertised, None), vec!["XOAUTH2"]);
    }

    #[test]
    fn test_unknown_mechanisms_skipped() {
        let advertised = names(&["KERBEROS_V4", "GSSAPI", "PLAIN"]);
        assert_eq!(ranked(&advertised, None), vec!["PLAIN"]);
    }

    #[test]
    fn test_case_insensitive() {
        let advertised = names(&["plain", "cram-md5"]);
        assert_eq!(ranked(&advertised, None), vec!["CRAM-MD5", "PLAIN"]);
    }

    #[test]
    fn test_try_create() {
        let creds = Credentials::new("user", "pass");
        let ctx = MechanismContext {
            credentials: &creds,
            protocol: "smtp",
            host: "mail.example.com",
            realm: None,
        };

        for name in PRIORITY {
            let auth = try_create(name, &ctx).unwrap();
            assert_eq!(auth.mechanism(), name);
        }
        assert!(try_create("GSSAPI", &ctx).is_err());
    }
}
