#![allow(dead_code)]

pub mod authority;
pub mod server;

// An empty file standing in for a keytab. Only its presence is checked
// before the login module is asked to log in.
pub fn keytab_file(name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("krb-http-{}-{}.keytab", std::process::id(), name));
    std::fs::write(&path, b"").expect("write keytab");
    path
}
