// src/login/config.rs

//! Login parameters derived from a [`CredentialIdentity`].

use std::collections::BTreeMap;
use std::path::Path;

use crate::identity::CredentialIdentity;

pub(crate) const USE_KEY_TAB: &str = "useKeyTab";
pub(crate) const USE_TICKET_CACHE: &str = "useTicketCache";
pub(crate) const KEY_TAB: &str = "keyTab";
pub(crate) const PRINCIPAL: &str = "principal";
pub(crate) const STORE_KEY: &str = "storeKey";
pub(crate) const DO_NOT_PROMPT: &str = "doNotPrompt";
pub(crate) const IS_INITIATOR: &str = "isInitiator";
pub(crate) const TICKET_CACHE: &str = "ticketCache";
pub(crate) const DEBUG: &str = "debug";

/// Where the login takes its credential from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginMode {
    /// Long-term key from a keytab file.
    Keytab,
    /// Previously issued tickets from the OS ticket cache.
    TicketCache,
}

/// Options for a single login attempt.
///
/// Built fresh for every call and never cached. The option names follow the
/// conventional Kerberos login-module vocabulary so that caller overrides
/// can address them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginConfiguration {
    options: BTreeMap<String, String>,
}

impl LoginConfiguration {
    /// Derive login options from an identity.
    ///
    /// Keytab mode needs both a keytab and a principal; anything less falls
    /// back to the ticket cache. `overrides` are merged last and win on any
    /// key collision. The keytab path is not checked here.
    pub fn build(identity: &CredentialIdentity, overrides: Option<&BTreeMap<String, String>>) -> Self {
        let mut options = BTreeMap::new();
        let principal = Some(identity.principal()).filter(|p| !p.is_empty());

        match (identity.keytab(), principal) {
            (Some(keytab), Some(principal)) => {
                options.insert(USE_KEY_TAB.to_owned(), "true".to_owned());
                options.insert(KEY_TAB.to_owned(), keytab.display().to_string());
                options.insert(PRINCIPAL.to_owned(), principal.to_owned());
                options.insert(STORE_KEY.to_owned(), "true".to_owned());
            }
            _ => {
                options.insert(USE_TICKET_CACHE.to_owned(), "true".to_owned());
            }
        }
        options.insert(DO_NOT_PROMPT.to_owned(), "true".to_owned());
        options.insert(IS_INITIATOR.to_owned(), "true".to_owned());

        if let Some(overrides) = overrides {
            options.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        LoginConfiguration { options }
    }

    /// The credential source these options select.
    pub fn mode(&self) -> LoginMode {
        if self.flag(USE_KEY_TAB) && self.keytab().is_some() {
            LoginMode::Keytab
        } else {
            LoginMode::TicketCache
        }
    }

    /// The keytab path option.
    pub fn keytab(&self) -> Option<&Path> {
        self.get(KEY_TAB).map(Path::new)
    }

    /// The principal option.
    pub fn principal(&self) -> Option<&str> {
        self.get(PRINCIPAL)
    }

    /// An explicit ticket cache name, when one was supplied as an override.
    pub fn ticket_cache(&self) -> Option<&str> {
        self.get(TICKET_CACHE)
    }

    pub fn store_key(&self) -> bool {
        self.flag(STORE_KEY)
    }

    pub fn do_not_prompt(&self) -> bool {
        self.flag(DO_NOT_PROMPT)
    }

    pub fn is_initiator(&self) -> bool {
        self.flag(IS_INITIATOR)
    }

    pub fn debug(&self) -> bool {
        self.flag(DEBUG)
    }

    /// Look up any option by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// All options, ordered by name.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).map_or(false, |v| v.eq_ignore_ascii_case("true"))
    }
}
