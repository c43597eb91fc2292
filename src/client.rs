// src/client.rs

//! An HTTP client whose only authentication scheme is SPNEGO.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::auth::{execute_with_negotiate, AuthSchemes, CredentialsProvider, SpnPolicy};
use crate::error::{self, Result};
use crate::identity::{PrincipalName, ServiceNameType};
use crate::login::SecurityContext;

#[cfg(not(feature = "rustls"))]
type Connector = HttpConnector;
#[cfg(feature = "rustls")]
type Connector = hyper_rustls::HttpsConnector<HttpConnector>;

/// A client preconfigured for Kerberos/SPNEGO negotiation.
///
/// Built once and immutable afterwards. Cloning is cheap and every clone
/// shares the same connection pool, so one client can serve any number of
/// concurrent calls. It holds no credentials of its own: each call brings
/// the [`SecurityContext`] it negotiates with.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientRef>,
}

struct ClientRef {
    hyper: hyper_util::client::legacy::Client<Connector, Full<Bytes>>,
    schemes: AuthSchemes,
    credentials: CredentialsProvider,
    spn_policy: SpnPolicy,
}

/// A `ClientBuilder` can be used to create an `HttpClient` with custom configuration.
#[must_use]
pub struct ClientBuilder {
    service_name_type: ServiceNameType,
    user_principal: String,
    service_principal: Option<String>,
    service_name: String,
    connect_timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn new(
        service_name_type: ServiceNameType,
        user_principal: impl Into<String>,
        service_principal: Option<String>,
    ) -> Self {
        ClientBuilder {
            service_name_type,
            user_principal: user_principal.into(),
            service_principal,
            service_name: "HTTP".to_owned(),
            connect_timeout: None,
        }
    }

    /// The service part of host-based principals. Defaults to `HTTP`.
    pub fn service_name(mut self, service: impl Into<String>) -> Self {
        self.service_name = service.into();
        self
    }

    /// Set a timeout for only the connect phase of a `Client`.
    ///
    /// Default is `None`.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Returns an `HttpClient` that uses this `ClientBuilder` configuration.
    ///
    /// # Errors
    ///
    /// Fails if the user principal is malformed, if a user-based client has
    /// no service principal, or if the TLS backend cannot be initialized.
    pub fn build(self) -> Result<HttpClient> {
        let user = PrincipalName::parse(&self.user_principal)?;

        let spn_policy = match self.service_name_type {
            ServiceNameType::HostBased => {
                SpnPolicy::host_based(self.service_name, user.realm().map(str::to_owned))
            }
            ServiceNameType::UserBased => {
                let service_principal = self.service_principal.ok_or_else(|| {
                    error::configuration("a user-based client needs a service principal")
                })?;
                PrincipalName::parse(&service_principal)?;
                SpnPolicy::user_based(service_principal)
            }
        };

        let mut http = HttpConnector::new();
        http.set_connect_timeout(self.connect_timeout);

        #[cfg(feature = "rustls")]
        let connector = {
            http.enforce_http(false);
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(error::configuration)?
                .https_or_http()
                .enable_http1()
                .wrap_connector(http)
        };
        #[cfg(not(feature = "rustls"))]
        let connector = http;

        let hyper = hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(connector);

        Ok(HttpClient {
            inner: Arc::new(ClientRef {
                hyper,
                schemes: AuthSchemes::negotiate_only(),
                credentials: CredentialsProvider::null_for_any(),
                spn_policy,
            }),
        })
    }
}

impl HttpClient {
    /// Creates a `ClientBuilder` to configure an `HttpClient`.
    pub fn builder(
        service_name_type: ServiceNameType,
        user_principal: impl Into<String>,
        service_principal: Option<String>,
    ) -> ClientBuilder {
        ClientBuilder::new(service_name_type, user_principal, service_principal)
    }

    /// The schemes this client answers challenges for.
    pub fn auth_schemes(&self) -> &AuthSchemes {
        &self.inner.schemes
    }

    pub fn credentials(&self) -> &CredentialsProvider {
        &self.inner.credentials
    }

    pub fn spn_policy(&self) -> &SpnPolicy {
        &self.inner.spn_policy
    }

    /// Execute `outgoing`, negotiating with `context` if the target asks.
    pub(crate) async fn execute(
        &self,
        context: &SecurityContext,
        outgoing: &Outgoing,
    ) -> Result<http::Response<Bytes>> {
        execute_with_negotiate(
            outgoing,
            context,
            &self.inner.spn_policy,
            &self.inner.schemes,
            &self.inner.credentials,
            |req| self.send(req, &outgoing.url),
        )
        .await
    }

    async fn send(&self, req: http::Request<Full<Bytes>>, url: &Url) -> Result<http::Response<Bytes>> {
        log::debug!("{} {}", req.method(), url);
        let res = self
            .inner
            .hyper
            .request(req)
            .await
            .map_err(|e| error::transport(e).with_url(url.clone()))?;

        let (parts, body) = res.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| error::transport(e).with_url(url.clone()))?
            .to_bytes();
        Ok(http::Response::from_parts(parts, body))
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("service_name_type", &self.service_name_type)
            .field("user_principal", &self.user_principal)
            .field("service_principal", &self.service_principal)
            .field("service_name", &self.service_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("schemes", &self.inner.schemes)
            .field("credentials", &self.inner.credentials)
            .field("spn_policy", &self.inner.spn_policy)
            .finish()
    }
}

/// A request that may need to be sent more than once.
pub(crate) struct Outgoing {
    pub(crate) method: Method,
    pub(crate) url: Url,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

impl Outgoing {
    pub(crate) fn get(url: Url) -> Self {
        Outgoing {
            method: Method::GET,
            url,
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub(crate) fn post(url: Url, content_type: HeaderValue, body: Bytes) -> Self {
        Outgoing {
            method: Method::POST,
            url,
            content_type: Some(content_type),
            body,
        }
    }

    pub(crate) fn to_request(&self, authorization: Option<HeaderValue>) -> Result<http::Request<Full<Bytes>>> {
        let mut builder = http::Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str());

        if let Some(ref content_type) = self.content_type {
            builder = builder.header(CONTENT_TYPE, content_type.clone());
        }
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }

        builder
            .body(Full::new(self.body.clone()))
            .map_err(|e| error::configuration(e).with_url(self.url.clone()))
    }
}
