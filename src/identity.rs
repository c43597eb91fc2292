// src/identity.rs

//! The Kerberos identity a client logs in as.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{self, Result};

/// How the target's Kerberos service principal is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceNameType {
    /// `<service>/<hostname>`, with the hostname taken from the request URL.
    HostBased,
    /// A fixed service principal supplied by the caller.
    UserBased,
}

impl fmt::Display for ServiceNameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceNameType::HostBased => f.write_str("HOST_BASED"),
            ServiceNameType::UserBased => f.write_str("USER_BASED"),
        }
    }
}

impl FromStr for ServiceNameType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "host-based" => Ok(ServiceNameType::HostBased),
            "user-based" => Ok(ServiceNameType::UserBased),
            other => Err(error::configuration(format!(
                "unknown service name type: {other:?}"
            ))),
        }
    }
}

/// A Kerberos principal name, `primary[/instance][@REALM]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrincipalName {
    name: String,
    realm_at: Option<usize>,
}

impl PrincipalName {
    /// Parse a principal name.
    ///
    /// Fails with a configuration error when the name is empty, contains
    /// whitespace or control characters, has an empty component, or carries
    /// more than one realm separator.
    pub fn parse(name: &str) -> Result<Self> {
        let malformed = |why: &str| error::configuration(format!("malformed principal {name:?}: {why}"));

        if name.is_empty() {
            return Err(malformed("empty"));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(malformed("contains whitespace"));
        }

        let mut parts = name.split('@');
        let primary = parts.next().unwrap_or_default();
        let realm = parts.next();
        if parts.next().is_some() {
            return Err(malformed("more than one realm separator"));
        }
        if primary.split('/').any(str::is_empty) {
            return Err(malformed("empty name component"));
        }
        if realm == Some("") {
            return Err(malformed("empty realm"));
        }

        Ok(PrincipalName {
            name: name.to_owned(),
            realm_at: realm.map(|_| primary.len()),
        })
    }

    /// The full name as supplied.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The realm, if the name carries one.
    pub fn realm(&self) -> Option<&str> {
        self.realm_at.map(|at| &self.name[at + 1..])
    }

    /// The name without its realm.
    pub fn without_realm(&self) -> &str {
        match self.realm_at {
            Some(at) => &self.name[..at],
            None => &self.name,
        }
    }
}

impl fmt::Display for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Who a client authenticates as, and how the target service is named.
///
/// Immutable once built. A missing keytab selects the ticket cache as the
/// credential source.
#[derive(Clone, Debug)]
pub struct CredentialIdentity {
    principal: String,
    keytab: Option<PathBuf>,
    service_principal: Option<String>,
    service_name_type: ServiceNameType,
}

impl CredentialIdentity {
    /// An identity that logs in from the ticket cache.
    pub fn new(principal: impl Into<String>, service_name_type: ServiceNameType) -> Self {
        CredentialIdentity {
            principal: principal.into(),
            keytab: None,
            service_principal: None,
            service_name_type,
        }
    }

    /// Log in with the long-term key stored in `keytab`.
    pub fn with_keytab(mut self, keytab: impl Into<PathBuf>) -> Self {
        self.keytab = Some(keytab.into());
        self
    }

    /// Use a fixed service principal for the target.
    pub fn with_service_principal(mut self, service_principal: impl Into<String>) -> Self {
        self.service_principal = Some(service_principal.into());
        self
    }

    /// The client principal name, as supplied.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The keytab path, if any.
    pub fn keytab(&self) -> Option<&Path> {
        self.keytab.as_deref()
    }

    /// The explicit service principal, if any.
    pub fn service_principal(&self) -> Option<&str> {
        self.service_principal.as_deref()
    }

    /// How the target's principal is derived.
    pub fn service_name_type(&self) -> ServiceNameType {
        self.service_name_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_at_realm() {
        let p = PrincipalName::parse("keyadmin@HWX.COM").unwrap();
        assert_eq!(p.as_str(), "keyadmin@HWX.COM");
        assert_eq!(p.realm(), Some("HWX.COM"));
        assert_eq!(p.without_realm(), "keyadmin");
    }

    #[test]
    fn parse_service_instance_without_realm() {
        let p = PrincipalName::parse("HTTP/node3.example.com").unwrap();
        assert_eq!(p.realm(), None);
        assert_eq!(p.without_realm(), "HTTP/node3.example.com");
    }

    #[test]
    fn reject_malformed_principals() {
        for bad in ["", "a b@R", "a@b@c", "user@", "/x@R", "x/@R", "@REALM"] {
            let err = PrincipalName::parse(bad).unwrap_err();
            assert!(err.is_configuration(), "{bad:?} should be a configuration error");
        }
    }

    #[test]
    fn service_name_type_from_str() {
        assert_eq!("HOST_BASED".parse::<ServiceNameType>().unwrap(), ServiceNameType::HostBased);
        assert_eq!("user-based".parse::<ServiceNameType>().unwrap(), ServiceNameType::UserBased);
        assert!("kerberos".parse::<ServiceNameType>().is_err());
        assert_eq!(ServiceNameType::UserBased.to_string(), "USER_BASED");
    }

    #[test]
    fn identity_defaults_to_ticket_cache() {
        let id = CredentialIdentity::new("keyadmin@HWX.COM", ServiceNameType::HostBased);
        assert!(id.keytab().is_none());
        assert!(id.service_principal().is_none());

        let id = id.with_keytab("/etc/security/keyadmin.keytab");
        assert_eq!(id.keytab(), Some(Path::new("/etc/security/keyadmin.keytab")));
    }
}
