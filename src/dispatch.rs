// src/dispatch.rs

//! Running GET and POST calls under a freshly logged in Kerberos identity.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode};
use url::Url;

use crate::client::{HttpClient, Outgoing};
use crate::error::{self, Result};
use crate::identity::{CredentialIdentity, PrincipalName, ServiceNameType};
use crate::login::{do_as, LoginConfiguration, LoginModule, LoginSession, Subject};

/// Executes calls against a SPNEGO-protected service.
///
/// Every call runs a full login cycle: a new [`LoginConfiguration`], a new
/// [`SecurityContext`](crate::login::SecurityContext), released when the call
/// ends. Nothing is cached between calls, and concurrent calls log in
/// independently. Only the [`HttpClient`] is shared.
///
/// Calls block the current thread. Do not use a dispatcher from within an
/// async runtime; it owns one of its own.
pub struct RequestDispatcher {
    identity: CredentialIdentity,
    login_options: BTreeMap<String, String>,
    session: LoginSession,
    client: HttpClient,
    runtime: tokio::runtime::Runtime,
}

impl RequestDispatcher {
    /// Start configuring a dispatcher that logs in as `principal`.
    pub fn builder(principal: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(principal)
    }

    /// Assemble a dispatcher from an explicitly constructed client and session.
    pub fn from_parts(identity: CredentialIdentity, client: HttpClient, session: LoginSession) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("krb-http-runtime")
            .enable_all()
            .build()
            .map_err(error::configuration)?;

        Ok(RequestDispatcher {
            identity,
            login_options: BTreeMap::new(),
            session,
            client,
            runtime,
        })
    }

    pub fn identity(&self) -> &CredentialIdentity {
        &self.identity
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// GET `url` and return the body. Only `200 OK` is accepted.
    pub fn execute_get(&self, url: &str) -> Result<String> {
        let url = parse_url(url)?;
        self.dispatch(Outgoing::get(url))
    }

    /// POST a JSON `body` to `url` and return the response body.
    /// Any `2xx` status is accepted.
    pub fn execute_post(&self, url: &str, body: impl Into<String>) -> Result<String> {
        let url = parse_url(url)?;
        let body = Bytes::from(body.into());
        self.dispatch(Outgoing::post(url, HeaderValue::from_static("application/json"), body))
    }

    /// Serialize `json` and POST it to `url`.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    pub fn execute_post_json<T: serde::Serialize + ?Sized>(&self, url: &str, json: &T) -> Result<String> {
        let url = parse_url(url)?;
        let body = serde_json::to_vec(json).map_err(|e| error::decode(e).with_url(url.clone()))?;
        self.dispatch(Outgoing::post(
            url,
            HeaderValue::from_static("application/json"),
            Bytes::from(body),
        ))
    }

    fn dispatch(&self, outgoing: Outgoing) -> Result<String> {
        let mut state = CallState::Unauthenticated;
        let result = self.run(&mut state, &outgoing);

        match result {
            Ok(_) => state.advance(CallState::Completed, &outgoing),
            Err(ref err) => {
                state.advance(CallState::Failed, &outgoing);
                log::error!("Error executing call to {}: {}", outgoing.url, err);
            }
        }
        result
    }

    fn run(&self, state: &mut CallState, outgoing: &Outgoing) -> Result<String> {
        let config = LoginConfiguration::build(&self.identity, Some(&self.login_options));
        let subject = Subject::new(PrincipalName::parse(self.identity.principal())?);

        state.advance(CallState::LoggingIn, outgoing);
        let context = self.session.login_subject(&config, subject)?;

        state.advance(CallState::Executing, outgoing);
        let response = do_as(context, |context| {
            self.runtime.block_on(self.client.execute(context, outgoing))
        })?;

        let status = response.status();
        if !accepts(&outgoing.method, status) {
            return Err(error::status_code(
                outgoing.url.clone(),
                outgoing.method.clone(),
                status,
                reason_phrase(&response),
            ));
        }

        String::from_utf8(response.into_body().to_vec())
            .map_err(|e| error::decode(e).with_url(outgoing.url.clone()))
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("identity", &self.identity)
            .field("client", &self.client)
            .finish()
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| error::configuration(format!("invalid URL {url:?}: {e}")))
}

/// The reason phrase the server sent, or the standard one for the status.
fn reason_phrase<B>(response: &http::Response<B>) -> String {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
        .or_else(|| response.status().canonical_reason())
        .unwrap_or("")
        .to_owned()
}

fn accepts(method: &Method, status: StatusCode) -> bool {
    if *method == Method::GET {
        status == StatusCode::OK
    } else {
        status.is_success()
    }
}

/// Where a single call is. Failure is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CallState {
    Unauthenticated,
    LoggingIn,
    Executing,
    Completed,
    Failed,
}

impl CallState {
    fn advance(&mut self, next: CallState, outgoing: &Outgoing) {
        debug_assert!(self.can_advance_to(next), "{self:?} -> {next:?}");
        log::trace!("{} {}: {:?} -> {:?}", outgoing.method, outgoing.url, self, next);
        *self = next;
    }

    fn can_advance_to(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Unauthenticated, LoggingIn) | (LoggingIn, Executing) | (Executing, Completed)
        ) || (next == Failed && !matches!(self, Completed | Failed))
    }
}

/// A `DispatcherBuilder` can be used to create a `RequestDispatcher` with custom configuration.
#[must_use]
pub struct DispatcherBuilder {
    principal: String,
    keytab: Option<PathBuf>,
    service_principal: Option<String>,
    service_name_type: ServiceNameType,
    service_name: Option<String>,
    login_options: BTreeMap<String, String>,
    login_module: Option<Arc<dyn LoginModule>>,
    connect_timeout: Option<Duration>,
}

impl DispatcherBuilder {
    fn new(principal: impl Into<String>) -> Self {
        DispatcherBuilder {
            principal: principal.into(),
            keytab: None,
            service_principal: None,
            service_name_type: ServiceNameType::HostBased,
            service_name: None,
            login_options: BTreeMap::new(),
            login_module: None,
            connect_timeout: None,
        }
    }

    /// Log in from this keytab instead of the ticket cache.
    pub fn keytab(mut self, keytab: impl Into<PathBuf>) -> Self {
        self.keytab = Some(keytab.into());
        self
    }

    pub fn service_principal(mut self, service_principal: impl Into<String>) -> Self {
        self.service_principal = Some(service_principal.into());
        self
    }

    /// Defaults to [`ServiceNameType::HostBased`].
    pub fn service_name_type(mut self, service_name_type: ServiceNameType) -> Self {
        self.service_name_type = service_name_type;
        self
    }

    /// The service part of host-based principals. Defaults to `HTTP`.
    pub fn service_name(mut self, service: impl Into<String>) -> Self {
        self.service_name = Some(service.into());
        self
    }

    /// Override a login option. Overrides win over computed options.
    pub fn login_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.login_options.insert(key.into(), value.into());
        self
    }

    /// Use a specific login backend.
    pub fn login_module(mut self, module: Arc<dyn LoginModule>) -> Self {
        self.login_module = Some(module);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Returns a `RequestDispatcher` that uses this configuration.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error if the principal is malformed, a
    /// user-based identity has no service principal, or no login module is
    /// available.
    pub fn build(self) -> Result<RequestDispatcher> {
        let mut identity = CredentialIdentity::new(self.principal, self.service_name_type);
        if let Some(keytab) = self.keytab {
            identity = identity.with_keytab(keytab);
        }
        if let Some(service_principal) = self.service_principal {
            identity = identity.with_service_principal(service_principal);
        }

        let mut client = HttpClient::builder(
            identity.service_name_type(),
            identity.principal(),
            identity.service_principal().map(str::to_owned),
        );
        if let Some(service) = self.service_name {
            client = client.service_name(service);
        }
        if let Some(timeout) = self.connect_timeout {
            client = client.connect_timeout(timeout);
        }
        let client = client.build()?;

        let module = match self.login_module {
            Some(module) => module,
            None => default_login_module()?,
        };

        let mut dispatcher = RequestDispatcher::from_parts(identity, client, LoginSession::new(module))?;
        dispatcher.login_options = self.login_options;
        Ok(dispatcher)
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("principal", &self.principal)
            .field("keytab", &self.keytab)
            .field("service_principal", &self.service_principal)
            .field("service_name_type", &self.service_name_type)
            .field("login_options", &self.login_options)
            .field("login_module", &self.login_module.is_some())
            .finish()
    }
}

#[cfg(feature = "gssapi")]
fn default_login_module() -> Result<Arc<dyn LoginModule>> {
    Ok(Arc::new(crate::login::Krb5LoginModule::new()))
}

#[cfg(not(feature = "gssapi"))]
fn default_login_module() -> Result<Arc<dyn LoginModule>> {
    Err(error::configuration(
        "no login module configured; enable the `gssapi` feature or supply one",
    ))
}
