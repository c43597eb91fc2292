// src/auth/mod.rs

//! Authentication schemes and credentials for HTTP Negotiate (SPNEGO).
//!
//! Only the `Negotiate` scheme is ever registered. The credentials provider
//! carries a single empty credential so that a credential always exists for
//! any target, while no scheme that needs a username or password (Basic,
//! Digest, NTLM) can be answered.

use std::fmt;

mod negotiate;

pub(crate) use negotiate::execute_with_negotiate;
pub use negotiate::{derive_spn, SpnPolicy};

/// An HTTP authentication scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// RFC 4559 `Negotiate`, carrying SPNEGO tokens.
    Negotiate,
}

impl AuthScheme {
    /// The scheme token as it appears in `WWW-Authenticate`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Negotiate => "Negotiate",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The schemes a client is willing to answer challenges for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthSchemes {
    registered: Vec<AuthScheme>,
}

impl AuthSchemes {
    /// A registry holding `Negotiate` and nothing else.
    pub fn negotiate_only() -> Self {
        AuthSchemes {
            registered: vec![AuthScheme::Negotiate],
        }
    }

    pub fn contains(&self, scheme: AuthScheme) -> bool {
        self.registered.contains(&scheme)
    }

    pub fn iter(&self) -> impl Iterator<Item = AuthScheme> + '_ {
        self.registered.iter().copied()
    }
}

/// Which targets a credential applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AuthScope {
    host: Option<String>,
    port: Option<u16>,
}

impl AuthScope {
    /// Matches every host and port.
    pub const ANY: AuthScope = AuthScope { host: None, port: None };

    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        AuthScope {
            host: Some(host.into()),
            port,
        }
    }

    /// Whether this scope covers a request to `host:port`.
    pub fn matches(&self, host: &str, port: Option<u16>) -> bool {
        self.host.as_deref().map_or(true, |h| h.eq_ignore_ascii_case(host))
            && self.port.map_or(true, |p| Some(p) == port)
    }
}

/// A credential offered for a scope.
///
/// `Null` has neither a principal nor a password. Negotiate finds its key
/// material in the security context instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Null,
}

impl Credentials {
    pub fn user_principal(&self) -> Option<&str> {
        match self {
            Credentials::Null => None,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            Credentials::Null => None,
        }
    }
}

/// Credentials looked up by scope before answering a challenge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialsProvider {
    entries: Vec<(AuthScope, Credentials)>,
}

impl CredentialsProvider {
    /// A provider holding exactly one [`Credentials::Null`] for [`AuthScope::ANY`].
    pub fn null_for_any() -> Self {
        let mut provider = CredentialsProvider::default();
        provider.set_credentials(AuthScope::ANY, Credentials::Null);
        provider
    }

    /// Register `credentials` for `scope`, replacing an existing entry for the same scope.
    pub fn set_credentials(&mut self, scope: AuthScope, credentials: Credentials) {
        match self.entries.iter_mut().find(|(s, _)| *s == scope) {
            Some(entry) => entry.1 = credentials,
            None => self.entries.push((scope, credentials)),
        }
    }

    /// The most specific credential covering `host:port`.
    pub fn credentials_for(&self, host: &str, port: Option<u16>) -> Option<&Credentials> {
        self.entries
            .iter()
            .filter(|(scope, _)| scope.matches(host, port))
            .max_by_key(|(scope, _)| scope.host.is_some() as u8 + scope.port.is_some() as u8)
            .map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
