//! # Configuration
//!
//! Environment-derived settings consumed by the core. The routing layer may
//! construct a [`Config`] directly instead of reading the process
//! environment.

use std::env;
use std::path::PathBuf;

/// Settings for the credential core.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding key pair files. Defaults to `$CWD/keys`, overridden
    /// by the `KEYS_DIR` environment variable.
    pub keys_dir: PathBuf,

    /// Base URL used to mint `verificationMethod` and status list IRIs,
    /// without a trailing slash. Overridden by `BASE_URL`.
    pub base_url: String,
}

impl Config {
    /// Build a configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let keys_dir = env::var_os("KEYS_DIR").map_or_else(
            || env::current_dir().unwrap_or_default().join("keys"),
            PathBuf::from,
        );
        let base_url = env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        Self::new(keys_dir, base_url)
    }

    /// Build a configuration from explicit values.
    pub fn new(keys_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            keys_dir: keys_dir.into(),
            base_url,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
