// src/auth/negotiate.rs

//! HTTP Negotiate protocol implementation.
//!
//! Implements the HTTP "Negotiate" authentication scheme (RFC 4559) on top of
//! an already logged in [`SecurityContext`]. Challenges for any other scheme
//! are left unanswered.

use base64::Engine as _;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use url::{Host, Url};

use super::{AuthScheme, AuthSchemes, CredentialsProvider};
use crate::client::Outgoing;
use crate::error::{self, Result};
use crate::identity::ServiceNameType;
use crate::login::SecurityContext;

const MAX_ROUNDTRIPS: usize = 5;

/// How the target's service principal is derived from a request URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpnPolicy {
    service_name_type: ServiceNameType,
    service: String,
    realm: Option<String>,
    service_principal: Option<String>,
}

impl SpnPolicy {
    /// `<service>/<host>[@realm]`, using the URL host exactly as written.
    pub fn host_based(service: impl Into<String>, realm: Option<String>) -> Self {
        SpnPolicy {
            service_name_type: ServiceNameType::HostBased,
            service: service.into(),
            realm,
            service_principal: None,
        }
    }

    /// Always the given service principal.
    pub fn user_based(service_principal: impl Into<String>) -> Self {
        SpnPolicy {
            service_name_type: ServiceNameType::UserBased,
            service: String::new(),
            realm: None,
            service_principal: Some(service_principal.into()),
        }
    }

    pub fn service_name_type(&self) -> ServiceNameType {
        self.service_name_type
    }
}

/// Derive the Service Principal Name (SPN) for a request URL.
///
/// The hostname is never resolved or canonicalized: aliases and short names
/// produce a principal for the alias itself. The port is not part of the SPN.
///
/// # Examples
/// ```
/// use krb_http::auth::{derive_spn, SpnPolicy};
///
/// let policy = SpnPolicy::host_based("HTTP", Some("HWX.COM".into()));
/// let url = url::Url::parse("http://node3:9292/kms/v1/keys/names").unwrap();
/// assert_eq!(derive_spn(&policy, &url).unwrap(), "HTTP/node3@HWX.COM");
/// ```
pub fn derive_spn(policy: &SpnPolicy, url: &Url) -> Result<String> {
    match policy.service_name_type {
        ServiceNameType::HostBased => {
            let host = match url.host() {
                Some(Host::Domain(domain)) => domain.to_owned(),
                Some(Host::Ipv4(addr)) => addr.to_string(),
                Some(Host::Ipv6(addr)) => addr.to_string(),
                None => {
                    return Err(error::negotiate("URL has no host for SPN").with_url(url.clone()));
                }
            };
            Ok(match policy.realm {
                Some(ref realm) => format!("{}/{}@{}", policy.service, host, realm),
                None => format!("{}/{}", policy.service, host),
            })
        }
        ServiceNameType::UserBased => policy
            .service_principal
            .clone()
            .ok_or_else(|| error::configuration("user-based SPN needs a service principal")),
    }
}

/// The registered-scheme challenge carried by a 401.
///
/// Returns `Some(None)` for a bare `Negotiate`, `Some(Some(token))` for
/// `Negotiate <token>`, and `None` when no registered scheme was offered.
fn parse_www_authenticate(headers: &HeaderMap, schemes: &AuthSchemes) -> Option<Option<Vec<u8>>> {
    let mut challenge = None;

    for value in headers.get_all(http::header::WWW_AUTHENTICATE) {
        let Ok(value_str) = value.to_str() else {
            continue;
        };
        let trimmed = value_str.trim();

        match strip_scheme(trimmed, AuthScheme::Negotiate.as_str()) {
            Some(rest) if schemes.contains(AuthScheme::Negotiate) => {
                let rest = rest.trim();
                if rest.is_empty() {
                    challenge.get_or_insert(None);
                } else if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(rest) {
                    challenge = Some(Some(decoded));
                }
            }
            _ => log::debug!("ignoring unregistered challenge: {trimmed}"),
        }
    }

    challenge
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let head = value.get(..scheme.len())?;
    let rest = &value[scheme.len()..];
    if head.eq_ignore_ascii_case(scheme) && (rest.is_empty() || rest.starts_with(' ')) {
        Some(rest)
    } else {
        None
    }
}

/// Execute a request, answering `Negotiate` challenges from `context`.
///
/// 1. Send the request without authentication
/// 2. On a 401 offering `Negotiate`, derive the SPN and start an exchange
/// 3. Resend with `Authorization: Negotiate <token>` until the target stops
///    asking, at most `MAX_ROUNDTRIPS` times
///
/// A 401 without a `Negotiate` challenge is returned to the caller untouched.
pub(crate) async fn execute_with_negotiate<F, Fut>(
    outgoing: &Outgoing,
    context: &SecurityContext,
    spn_policy: &SpnPolicy,
    schemes: &AuthSchemes,
    credentials: &CredentialsProvider,
    mut execute_fn: F,
) -> Result<http::Response<Bytes>>
where
    F: FnMut(http::Request<http_body_util::Full<Bytes>>) -> Fut,
    Fut: std::future::Future<Output = Result<http::Response<Bytes>>>,
{
    let url = &outgoing.url;

    let response = execute_fn(outgoing.to_request(None)?).await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }

    let Some(mut input_token) = parse_www_authenticate(response.headers(), schemes) else {
        log::debug!("401 from {url} carries no Negotiate challenge");
        return Ok(response);
    };

    let host = url.host_str().unwrap_or_default();
    if credentials
        .credentials_for(host, url.port_or_known_default())
        .is_none()
    {
        log::debug!("no credentials registered for {host}, leaving challenge unanswered");
        return Ok(response);
    }

    let spn = derive_spn(spn_policy, url)?;
    log::debug!("negotiating with {spn} as {}", context.principal());

    let mut negotiation = context.initiate(&spn).map_err(|e| e.with_url(url.clone()))?;
    let mut round = 0;

    loop {
        if round >= MAX_ROUNDTRIPS {
            return Err(error::negotiate("Too many authentication round-trips").with_url(url.clone()));
        }

        let token = negotiation
            .step(input_token.as_deref())
            .map_err(|e| error::negotiate(e).with_url(url.clone()))?
            .ok_or_else(|| {
                error::negotiate(format!("no token produced for {spn}")).with_url(url.clone())
            })?;

        let token_base64 = base64::engine::general_purpose::STANDARD.encode(&token);
        let authorization = HeaderValue::from_str(&format!("Negotiate {}", token_base64))
            .map_err(|_| error::negotiate("Invalid authorization header"))?;

        let response = execute_fn(outgoing.to_request(Some(authorization))?).await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => match parse_www_authenticate(response.headers(), schemes) {
                Some(Some(server_token)) if !negotiation.is_complete() => {
                    input_token = Some(server_token);
                    round += 1;
                }
                _ => {
                    return Err(error::negotiate(format!("{spn} rejected the Negotiate token"))
                        .with_url(url.clone()));
                }
            },
            status => {
                if status.is_success() {
                    if let Some(Some(server_token)) = parse_www_authenticate(response.headers(), schemes) {
                        if !negotiation.is_complete() {
                            if let Err(e) = negotiation.step(Some(&server_token)) {
                                log::warn!("mutual authentication with {spn} failed: {e}");
                            }
                        }
                        log::debug!("Mutual authentication token received from {spn}");
                    }
                }
                return Ok(response);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiate_only() -> AuthSchemes {
        AuthSchemes::negotiate_only()
    }

    #[test]
    fn test_derive_spn() {
        let policy = SpnPolicy::host_based("HTTP", None);

        let url = Url::parse("http://example.com/path").unwrap();
        assert_eq!(derive_spn(&policy, &url).unwrap(), "HTTP/example.com");

        let url = Url::parse("https://server.corp.com:8080/api").unwrap();
        assert_eq!(derive_spn(&policy, &url).unwrap(), "HTTP/server.corp.com");
    }

    #[test]
    fn test_derive_spn_keeps_alias() {
        let policy = SpnPolicy::host_based("HTTP", Some("HWX.COM".into()));

        let url = Url::parse("http://localhost:9292/kms").unwrap();
        assert_eq!(derive_spn(&policy, &url).unwrap(), "HTTP/localhost@HWX.COM");

        let url = Url::parse("http://127.0.0.1:9292/kms").unwrap();
        assert_eq!(derive_spn(&policy, &url).unwrap(), "HTTP/127.0.0.1@HWX.COM");

        let url = Url::parse("http://[::1]:9292/kms").unwrap();
        assert_eq!(derive_spn(&policy, &url).unwrap(), "HTTP/::1@HWX.COM");
    }

    #[test]
    fn test_derive_spn_user_based() {
        let policy = SpnPolicy::user_based("kms@HWX.COM");
        let url = Url::parse("http://node3.example.com:9292/").unwrap();
        assert_eq!(derive_spn(&policy, &url).unwrap(), "kms@HWX.COM");
    }

    #[test]
    fn test_parse_www_authenticate_negotiate() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Negotiate"),
        );

        let negotiate = parse_www_authenticate(&headers, &negotiate_only());
        assert_eq!(negotiate, Some(None));
    }

    #[test]
    fn test_parse_www_authenticate_with_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("negotiate YIIFzgYGKwYBBQUCoIIFwjCCBb4="),
        );

        let negotiate = parse_www_authenticate(&headers, &negotiate_only());
        assert!(matches!(negotiate, Some(Some(ref token)) if !token.is_empty()));
    }

    #[test]
    fn test_parse_www_authenticate_ignores_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"test\""),
        );
        headers.append(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("NTLM"),
        );
        headers.append(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("NegotiateX"),
        );

        assert_eq!(parse_www_authenticate(&headers, &negotiate_only()), None);
    }

    #[test]
    fn test_parse_www_authenticate_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Negotiate"),
        );
        headers.append(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("NTLM"),
        );
        headers.append(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"test\""),
        );

        assert_eq!(parse_www_authenticate(&headers, &negotiate_only()), Some(None));
    }
}
