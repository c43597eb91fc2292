// src/login/env.rs

//! Process environment variables read by the Kerberos libraries.

use std::sync::OnceLock;

use crate::error::{self, Result};

/// An environment variable that is written at most once per process.
///
/// The Kerberos libraries read their credential sources from the
/// environment on any thread, so the variable is exported by the first
/// login and never changed afterwards. Asking for a different value later
/// is a configuration error.
pub(crate) struct ProcessEnv {
    var: &'static str,
    value: OnceLock<String>,
}

impl ProcessEnv {
    pub(crate) const fn new(var: &'static str) -> Self {
        ProcessEnv {
            var,
            value: OnceLock::new(),
        }
    }

    pub(crate) fn export(&self, value: &str) -> Result<()> {
        let exported = self.value.get_or_init(|| {
            std::env::set_var(self.var, value);
            log::debug!("exported {}={}", self.var, value);
            value.to_owned()
        });

        if exported != value {
            return Err(error::configuration(format!(
                "{} is already set to {exported:?} for this process; cannot switch to {value:?}",
                self.var
            )));
        }
        Ok(())
    }
}
