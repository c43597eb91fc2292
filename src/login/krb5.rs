// src/login/krb5.rs

//! Kerberos login through the system GSS-API.

use std::sync::Mutex;

use libgssapi::{
    context::{ClientCtx, CtxFlags, SecurityContext as _},
    credential::{Cred, CredUsage},
    name::Name,
    oid::{Oid, OidSet, GSS_MECH_KRB5, GSS_NT_KRB5_PRINCIPAL},
};

use super::env::ProcessEnv;
use super::{BoxError, LoginConfiguration, LoginMode, LoginModule, NegotiationContext, Subject, Ticket};

// 1.3.6.1.5.5.2
const GSS_MECH_SPNEGO: Oid = Oid::from_slice(&[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02]);

static CLIENT_KTNAME: ProcessEnv = ProcessEnv::new("KRB5_CLIENT_KTNAME");
static CCNAME: ProcessEnv = ProcessEnv::new("KRB5CCNAME");

/// Logs in against the KDC with the system Kerberos libraries.
///
/// In keytab mode the keytab is exported as the client keytab
/// (`KRB5_CLIENT_KTNAME`) so the library can obtain initial tickets for the
/// principal without prompting. The variable is process wide and exported
/// once: logging in with a second keytab in the same process fails with a
/// configuration error. The initial tickets are obtained during login, so a
/// rejected keytab fails the login rather than the first negotiation.
#[derive(Debug, Default)]
pub struct Krb5LoginModule {
    _priv: (),
}

impl Krb5LoginModule {
    pub fn new() -> Self {
        Krb5LoginModule::default()
    }
}

impl LoginModule for Krb5LoginModule {
    fn login(&self, config: &LoginConfiguration, subject: &Subject) -> Result<Box<dyn Ticket>, BoxError> {
        if config.debug() {
            log::debug!("krb5 login options: {:?}", config.options());
        }
        if !config.do_not_prompt() {
            log::debug!("doNotPrompt=false has no effect, GSS-API never prompts");
        }

        match config.mode() {
            LoginMode::Keytab => {
                if let Some(keytab) = config.keytab() {
                    CLIENT_KTNAME.export(&keytab.display().to_string())?;
                }
            }
            LoginMode::TicketCache => {
                if let Some(cache) = config.ticket_cache() {
                    CCNAME.export(cache)?;
                }
            }
        }

        let principal = config
            .principal()
            .unwrap_or_else(|| subject.principal().as_str());
        let name = Name::new(principal.as_bytes(), Some(&GSS_NT_KRB5_PRINCIPAL))?;

        let mut mechs = OidSet::new()?;
        mechs.add(&GSS_MECH_KRB5)?;
        mechs.add(&GSS_MECH_SPNEGO)?;

        let usage = if config.is_initiator() {
            CredUsage::Initiate
        } else {
            CredUsage::Both
        };
        let cred = Cred::acquire(Some(&name), None, usage, Some(&mechs))?;
        // a keytab credential is only resolved against the KDC when inquired
        cred.lifetime()?;
        log::debug!("acquired {:?} credential for {principal}", config.mode());

        Ok(Box::new(Krb5Ticket {
            cred: Mutex::new(Some(cred)),
        }))
    }
}

struct Krb5Ticket {
    // handed to the first negotiation, one per call
    cred: Mutex<Option<Cred>>,
}

impl Ticket for Krb5Ticket {
    fn initiate(&self, spn: &str) -> Result<Box<dyn NegotiationContext>, BoxError> {
        let cred = self
            .cred
            .lock()
            .map_err(|_| "credential lock poisoned")?
            .take()
            .ok_or("credential already used for a negotiation")?;

        // KRB5_PRINCIPAL names are taken literally, without hostname canonicalization
        let target = Name::new(spn.as_bytes(), Some(&GSS_NT_KRB5_PRINCIPAL))?;
        let flags = CtxFlags::GSS_C_MUTUAL_FLAG | CtxFlags::GSS_C_SEQUENCE_FLAG;
        let inner = ClientCtx::new(Some(cred), target, flags, Some(&GSS_MECH_SPNEGO));

        Ok(Box::new(Krb5Negotiation { inner }))
    }

    fn release(&mut self) {
        if let Ok(mut cred) = self.cred.lock() {
            cred.take();
        }
    }
}

struct Krb5Negotiation {
    inner: ClientCtx,
}

impl NegotiationContext for Krb5Negotiation {
    fn step(&mut self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>, BoxError> {
        let token = self.inner.step(input, None)?;
        Ok(token.map(|t| t.to_vec()))
    }

    fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }
}
