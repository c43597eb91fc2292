// src/login/mod.rs

//! Kerberos login and the security context it produces.
//!
//! A login turns a [`LoginConfiguration`] into a [`SecurityContext`]: the
//! authenticated principal plus its private credential. The actual exchange
//! with the authentication authority is delegated to a [`LoginModule`];
//! with the `gssapi` feature enabled, [`Krb5LoginModule`] talks to the system
//! Kerberos libraries.
//!
//! Contexts are never cached. Each one is owned by the call that created it
//! and released when [`do_as`] returns.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

mod config;
#[cfg(any(feature = "gssapi", test))]
mod env;
#[cfg(feature = "gssapi")]
mod krb5;

pub use self::config::{LoginConfiguration, LoginMode};
#[cfg(feature = "gssapi")]
pub use self::krb5::Krb5LoginModule;

use crate::error::{self, Result};
use crate::identity::PrincipalName;

/// Errors reported by login backends.
///
/// The session maps them into [`Error`](crate::Error): failures during
/// login become authentication errors, failures while producing tokens
/// become negotiate errors. A backend that returns a boxed
/// [`Error`](crate::Error) from `login` keeps its kind.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A backend able to log a principal in against the authentication authority.
///
/// Implementations block until the authority answers and must not retry.
pub trait LoginModule: Send + Sync {
    /// Obtain a credential for the principal declared by `subject`.
    fn login(
        &self,
        config: &LoginConfiguration,
        subject: &Subject,
    ) -> std::result::Result<Box<dyn Ticket>, BoxError>;
}

/// The private credential held by a [`SecurityContext`].
pub trait Ticket: Send + Sync {
    /// Start a SPNEGO exchange with the service named `spn`.
    fn initiate(&self, spn: &str) -> std::result::Result<Box<dyn NegotiationContext>, BoxError>;

    /// Give the credential back. Called exactly once, when the owning
    /// context is released.
    fn release(&mut self) {}
}

/// One in-flight SPNEGO exchange.
pub trait NegotiationContext: Send {
    /// Produce the next token, optionally consuming one from the target.
    ///
    /// Returns `None` once the exchange needs nothing more from the client.
    fn step(&mut self, input: Option<&[u8]>) -> std::result::Result<Option<Vec<u8>>, BoxError>;

    fn is_complete(&self) -> bool;
}

/// An identity container declaring the principal that is about to log in.
#[derive(Clone, Debug)]
pub struct Subject {
    principal: PrincipalName,
}

impl Subject {
    pub fn new(principal: PrincipalName) -> Self {
        Subject { principal }
    }

    pub fn principal(&self) -> &PrincipalName {
        &self.principal
    }
}

/// An authenticated principal and its ticket.
pub struct SecurityContext {
    principal: PrincipalName,
    ticket: Option<Box<dyn Ticket>>,
}

impl SecurityContext {
    /// The principal this context was logged in as.
    pub fn principal(&self) -> &PrincipalName {
        &self.principal
    }

    /// Begin negotiating with `spn` using this context's ticket.
    pub fn initiate(&self, spn: &str) -> Result<Box<dyn NegotiationContext>> {
        let ticket = self
            .ticket
            .as_ref()
            .ok_or_else(|| error::negotiate("security context has been released"))?;
        ticket.initiate(spn).map_err(error::negotiate)
    }

    fn release(&mut self) {
        if let Some(mut ticket) = self.ticket.take() {
            ticket.release();
            log::debug!("released security context for {}", self.principal);
        }
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("principal", &self.principal)
            .field("released", &self.ticket.is_none())
            .finish()
    }
}

/// Run `action` as the authenticated principal of `context`.
///
/// The context is handed to the action explicitly and released as soon as
/// the action returns, on success and failure alike.
pub fn do_as<T, F>(mut context: SecurityContext, action: F) -> T
where
    F: FnOnce(&SecurityContext) -> T,
{
    let out = action(&context);
    context.release();
    out
}

/// Performs logins through a [`LoginModule`].
#[derive(Clone)]
pub struct LoginSession {
    module: Arc<dyn LoginModule>,
}

impl LoginSession {
    pub fn new(module: Arc<dyn LoginModule>) -> Self {
        LoginSession { module }
    }

    /// Log `principal` in with the given options.
    pub fn login(&self, config: &LoginConfiguration, principal: &str) -> Result<SecurityContext> {
        let subject = Subject::new(PrincipalName::parse(principal)?);
        self.login_subject(config, subject)
    }

    /// Log in the principal declared by `subject`.
    ///
    /// In keytab mode the keytab must be a readable file; this is checked
    /// before the authority is contacted.
    pub fn login_subject(&self, config: &LoginConfiguration, subject: Subject) -> Result<SecurityContext> {
        if config.mode() == LoginMode::Keytab {
            if let Some(keytab) = config.keytab() {
                check_keytab(keytab)?;
            }
        }

        log::debug!("logging in {} ({:?})", subject.principal(), config.mode());
        let ticket = self
            .module
            .login(config, &subject)
            .map_err(|e| match e.downcast::<crate::Error>() {
                Ok(err) => *err,
                Err(e) => error::authentication(e),
            })?;

        Ok(SecurityContext {
            principal: subject.principal,
            ticket: Some(ticket),
        })
    }
}

impl fmt::Debug for LoginSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginSession").finish()
    }
}

fn check_keytab(path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| {
        error::authentication(format!("keytab {} is not readable: {e}", path.display()))
    })?;
    let meta = file.metadata().map_err(error::authentication)?;
    if !meta.is_file() {
        return Err(error::authentication(format!(
            "keytab {} is not a file",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CredentialIdentity, ServiceNameType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        logins: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    struct CountingTicket(Arc<AtomicUsize>);

    impl Ticket for CountingTicket {
        fn initiate(&self, _spn: &str) -> std::result::Result<Box<dyn NegotiationContext>, BoxError> {
            Err("no exchange in this test".into())
        }

        fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl LoginModule for Counting {
        fn login(
            &self,
            _config: &LoginConfiguration,
            _subject: &Subject,
        ) -> std::result::Result<Box<dyn Ticket>, BoxError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingTicket(self.released.clone())))
        }
    }

    fn session() -> (LoginSession, Arc<Counting>) {
        let module = Arc::new(Counting {
            logins: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        });
        (LoginSession::new(module.clone()), module)
    }

    #[test]
    fn login_binds_supplied_principal() {
        let (session, module) = session();
        let id = CredentialIdentity::new("keyadmin@HWX.COM", ServiceNameType::HostBased);
        let config = LoginConfiguration::build(&id, None);

        let ctx = session.login(&config, "keyadmin@HWX.COM").unwrap();
        assert_eq!(ctx.principal().as_str(), "keyadmin@HWX.COM");
        assert_eq!(module.logins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_keytab_fails_before_module() {
        let (session, module) = session();
        let id = CredentialIdentity::new("keyadmin@HWX.COM", ServiceNameType::HostBased)
            .with_keytab("/nonexistent/keyadmin.keytab");
        let config = LoginConfiguration::build(&id, None);

        let err = session.login(&config, "keyadmin@HWX.COM").unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(module.logins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn malformed_principal_is_configuration_error() {
        let (session, module) = session();
        let id = CredentialIdentity::new("bad principal", ServiceNameType::HostBased);
        let config = LoginConfiguration::build(&id, None);

        let err = session.login(&config, "bad principal").unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(module.logins.load(Ordering::SeqCst), 0);
    }

    struct Misconfigured;

    impl LoginModule for Misconfigured {
        fn login(
            &self,
            _config: &LoginConfiguration,
            _subject: &Subject,
        ) -> std::result::Result<Box<dyn Ticket>, BoxError> {
            Err(Box::new(error::configuration("keytab already exported")))
        }
    }

    #[test]
    fn backend_error_kind_is_kept() {
        let session = LoginSession::new(Arc::new(Misconfigured));
        let id = CredentialIdentity::new("keyadmin@HWX.COM", ServiceNameType::HostBased);
        let config = LoginConfiguration::build(&id, None);

        let err = session.login(&config, "keyadmin@HWX.COM").unwrap_err();
        assert!(err.is_configuration(), "{err:?}");
    }

    #[test]
    fn do_as_releases_context() {
        let (session, module) = session();
        let id = CredentialIdentity::new("keyadmin@HWX.COM", ServiceNameType::HostBased);
        let config = LoginConfiguration::build(&id, None);
        let ctx = session.login(&config, "keyadmin@HWX.COM").unwrap();

        let seen = do_as(ctx, |ctx| {
            let Err(err) = ctx.initiate("HTTP/svc@HWX.COM") else {
                panic!("initiate should fail without an exchange");
            };
            assert!(err.is_negotiation());
            ctx.principal().to_string()
        });

        assert_eq!(seen, "keyadmin@HWX.COM");
        assert_eq!(module.released.load(Ordering::SeqCst), 1);
    }
}
