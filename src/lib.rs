#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # krb-http
//!
//! A blocking HTTP client that authenticates to Kerberos/SPNEGO protected
//! services as a service identity, without interactive prompts.
//!
//! Each call:
//!
//! - builds login options from the [`CredentialIdentity`] (keytab, or the
//!   ticket cache when no keytab is configured),
//! - logs in, producing a fresh [`SecurityContext`](login::SecurityContext),
//! - sends the request, answering `Negotiate` challenges from that context,
//! - checks the status and returns the body.
//!
//! Nothing is cached between calls.
//!
//! ```no_run
//! # fn run() -> krb_http::Result<()> {
//! let dispatcher = krb_http::RequestDispatcher::builder("keyadmin@EXAMPLE.COM")
//!     .keytab("/etc/security/keytabs/keyadmin.keytab")
//!     .build()?;
//!
//! let names = dispatcher.execute_get("http://kms.example.com:9292/kms/v1/keys/names")?;
//! println!("{names}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Service principals
//!
//! With [`ServiceNameType::HostBased`] the target is `HTTP/<host>@<REALM>`,
//! where `<host>` is the hostname exactly as written in the request URL. No
//! DNS lookup or canonicalization takes place, so aliases and short names
//! must have principals of their own in the KDC. With
//! [`ServiceNameType::UserBased`] the configured service principal is used
//! as is.
//!
//! ## Optional Features
//!
//! - **json** *(enabled by default)*: Provides
//!   [`RequestDispatcher::execute_post_json`].
//! - **gssapi**: Log in through the system GSS-API with
//!   [`login::Krb5LoginModule`]. Without it a
//!   [`LoginModule`](login::LoginModule) must be supplied.
//! - **rustls**: Allows `https` targets.

pub use http::{Method, StatusCode};
pub use url::Url;

pub mod auth;
mod client;
mod dispatch;
mod error;
mod identity;
pub mod login;

pub use self::client::{ClientBuilder, HttpClient};
pub use self::dispatch::{DispatcherBuilder, RequestDispatcher};
pub use self::error::{Error, Result};
pub use self::identity::{CredentialIdentity, PrincipalName, ServiceNameType};
