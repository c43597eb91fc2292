//! A scripted stand-in for the KDC.
//!
//! Tickets produce the token `spnego:<client>:<spn>`, so a test server can
//! tell who negotiated and for which service principal. A server that
//! answers with `continue` asks for one more leg; `mutual-ok` completes the
//! exchange.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use krb_http::login::{BoxError, LoginConfiguration, LoginModule, NegotiationContext, Subject, Ticket};

pub const CONTINUE: &[u8] = b"continue";
pub const MUTUAL_OK: &[u8] = b"mutual-ok";

#[derive(Default)]
pub struct Authority {
    reject: bool,
    logins: AtomicUsize,
    releases: Arc<AtomicUsize>,
    seen: Mutex<Vec<LoginConfiguration>>,
}

impl Authority {
    pub fn new() -> Arc<Authority> {
        Arc::new(Authority::default())
    }

    pub fn rejecting() -> Arc<Authority> {
        Arc::new(Authority {
            reject: true,
            ..Authority::default()
        })
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn configurations(&self) -> Vec<LoginConfiguration> {
        self.seen.lock().unwrap().clone()
    }
}

impl LoginModule for Authority {
    fn login(&self, config: &LoginConfiguration, subject: &Subject) -> Result<Box<dyn Ticket>, BoxError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(config.clone());

        if self.reject {
            return Err(format!("Client not found in Kerberos database: {}", subject.principal()).into());
        }

        Ok(Box::new(FakeTicket {
            client: subject.principal().to_string(),
            releases: self.releases.clone(),
        }))
    }
}

struct FakeTicket {
    client: String,
    releases: Arc<AtomicUsize>,
}

impl Ticket for FakeTicket {
    fn initiate(&self, spn: &str) -> Result<Box<dyn NegotiationContext>, BoxError> {
        Ok(Box::new(FakeNegotiation {
            token: token_for(&self.client, spn),
            legs: 0,
            complete: false,
        }))
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeNegotiation {
    token: Vec<u8>,
    legs: usize,
    complete: bool,
}

impl NegotiationContext for FakeNegotiation {
    fn step(&mut self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>, BoxError> {
        match input {
            None if self.legs == 0 => {
                self.legs += 1;
                Ok(Some(self.token.clone()))
            }
            Some(CONTINUE) => {
                self.legs += 1;
                Ok(Some(self.token.clone()))
            }
            Some(MUTUAL_OK) => {
                self.complete = true;
                Ok(None)
            }
            _ => Err("unexpected token from target".into()),
        }
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

pub fn token_for(client: &str, spn: &str) -> Vec<u8> {
    format!("spnego:{client}:{spn}").into_bytes()
}

/// The `Authorization` value a client logged in as `client` sends to `spn`.
pub fn authorization_for(client: &str, spn: &str) -> String {
    format!(
        "Negotiate {}",
        base64::engine::general_purpose::STANDARD.encode(token_for(client, spn))
    )
}

pub fn challenge(token: &[u8]) -> String {
    format!("Negotiate {}", base64::engine::general_purpose::STANDARD.encode(token))
}
