// demos/kms_rest.rs

//! Create a key on a Kerberos-protected key management service, then list
//! the key names.
//!
//! # Usage
//!
//! ```bash
//! KMS_BASE_URI=http://node3.example.com:9292 \
//! KMS_KEYTAB=/etc/security/keytabs/keyadmin.keytab \
//! KMS_PRINCIPAL=keyadmin@EXAMPLE.COM \
//! RUST_LOG=krb_http=debug \
//!     cargo run --example kms_rest --features gssapi
//! ```
//!
//! `KMS_SERVICE_NAME_TYPE` may be `HOST_BASED` (default) or `USER_BASED`;
//! the latter also needs `KMS_SERVICE_PRINCIPAL`.

use krb_http::{RequestDispatcher, ServiceNameType};
use serde::Serialize;

#[derive(Serialize)]
struct NewKey<'a> {
    name: &'a str,
    cipher: &'a str,
    length: u32,
    material: &'a str,
    description: &'a str,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let base_uri = env_or("KMS_BASE_URI", "http://node3.example.com:9292");
    let principal = env_or("KMS_PRINCIPAL", "keyadmin@EXAMPLE.COM");
    let service_name_type: ServiceNameType = env_or("KMS_SERVICE_NAME_TYPE", "HOST_BASED").parse()?;

    let mut builder = RequestDispatcher::builder(principal).service_name_type(service_name_type);
    if let Ok(keytab) = std::env::var("KMS_KEYTAB") {
        builder = builder.keytab(keytab);
    }
    if let Ok(service_principal) = std::env::var("KMS_SERVICE_PRINCIPAL") {
        builder = builder.service_principal(service_principal);
    }
    let dispatcher = builder.build()?;

    let key = NewKey {
        name: "test_key7",
        cipher: "aes",
        length: 128,
        material: "lksvIq3yy9Xxk4EZTfLv6g",
        description: "test key7",
    };

    // failures are already logged by the dispatcher; keep going
    match dispatcher.execute_post_json(&format!("{base_uri}/kms/v1/keys"), &key) {
        Ok(result) => println!("Result for add key: {result}"),
        Err(err) => eprintln!("add key failed: {err}"),
    }

    match dispatcher.execute_get(&format!("{base_uri}/kms/v1/keys/names")) {
        Ok(result) => println!("Result for get keys: {result}"),
        Err(err) => eprintln!("get keys failed: {err}"),
    }

    Ok(())
}
