// src/error.rs

#![deny(missing_docs)]
//! Error and Result module.

use std::error::Error as StdError;
use std::fmt;

use http::{Method, StatusCode};
use url::Url;

/// A `Result` alias where the `Err` case is `krb_http::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The Errors that may occur when logging in or executing a call.
///
/// Every failure, whatever stage produced it, is surfaced as this single
/// value. The original cause is reachable through
/// [`source`](std::error::Error::source).
pub struct Error {
    inner: Box<Inner>,
}

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    url: Option<Url>,
    method: Option<Method>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                url: None,
                method: None,
            }),
        }
    }

    /// Returns a possible URL related to this error.
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Returns the HTTP method of the call that failed, if known.
    pub fn method(&self) -> Option<&Method> {
        self.inner.method.as_ref()
    }

    /// Add a url related to this error (overwriting any existing)
    pub fn with_url(mut self, url: Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    pub(crate) fn with_method(mut self, method: Method) -> Self {
        self.inner.method = Some(method);
        self
    }

    /// Returns true if the error comes from invalid identity or client setup.
    pub fn is_configuration(&self) -> bool {
        matches!(self.inner.kind, Kind::Configuration)
    }

    /// Returns true if the authentication authority rejected the login,
    /// or the keytab could not be read.
    pub fn is_authentication(&self) -> bool {
        matches!(self.inner.kind, Kind::Authentication)
    }

    /// Returns true if the SPNEGO exchange with the target failed.
    pub fn is_negotiation(&self) -> bool {
        matches!(self.inner.kind, Kind::Negotiation)
    }

    /// Returns true if the error is network related.
    pub fn is_transport(&self) -> bool {
        matches!(self.inner.kind, Kind::Transport)
    }

    /// Returns true if the target answered with a status the call does not accept.
    pub fn is_protocol(&self) -> bool {
        matches!(self.inner.kind, Kind::Protocol(..))
    }

    /// Returns true if a body could not be decoded or encoded.
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode)
    }

    /// Returns the status code, if the error was generated from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self.inner.kind {
            Kind::Protocol(code, _) => Some(code),
            _ => None,
        }
    }

    /// Returns the reason phrase, if the error was generated from a response.
    pub fn reason(&self) -> Option<&str> {
        match &self.inner.kind {
            Kind::Protocol(_, reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("krb_http::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref method) = self.inner.method {
            builder.field("method", method);
        }

        if let Some(ref url) = self.inner.url {
            builder.field("url", &url.as_str());
        }

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Configuration => f.write_str("configuration error")?,
            Kind::Authentication => f.write_str("authentication error")?,
            Kind::Negotiation => f.write_str("negotiate error")?,
            Kind::Transport => f.write_str("error sending request")?,
            Kind::Decode => f.write_str("error decoding body")?,
            Kind::Protocol(ref code, ref reason) => {
                let prefix = if code.is_client_error() {
                    "HTTP status client error"
                } else if code.is_server_error() {
                    "HTTP status server error"
                } else {
                    "unexpected HTTP status"
                };
                write!(f, "{prefix} ({} {})", code.as_str(), reason)?;
            }
        };

        if let Some(method) = &self.inner.method {
            write!(f, " in {method} request")?;
        }

        if let Some(url) = &self.inner.url {
            write!(f, " for url ({url})")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Configuration,
    Authentication,
    Negotiation,
    Transport,
    Protocol(StatusCode, String),
    Decode,
}

// constructors

pub(crate) fn configuration<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Configuration, Some(e))
}

pub(crate) fn authentication<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Authentication, Some(e))
}

pub(crate) fn negotiate<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Negotiation, Some(e))
}

pub(crate) fn transport<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Transport, Some(e))
}

pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Decode, Some(e))
}

pub(crate) fn status_code(url: Url, method: Method, status: StatusCode, reason: String) -> Error {
    Error::new(Kind::Protocol(status, reason), None::<Error>)
        .with_url(url)
        .with_method(method)
}
