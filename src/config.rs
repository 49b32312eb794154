//! Runtime configuration for the payment app finder.
//!
//! Every field has a default, so an empty TOML document yields a usable
//! production configuration.

use crate::domain::app_store::{GOOGLE_PLAY_BILLING, GOOGLE_PLAY_PACKAGE};
use crate::error::{FinderError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Tunables shared by the classifier, the manifest pipeline and the transports.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinderConfig {
    /// Permit plain `http` method and manifest URLs (test and dev builds).
    #[serde(default)]
    pub allow_http: bool,

    /// Path joined onto a URL method's origin to locate its payment method manifest.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Timeout for a single HTTP fetch, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Documents larger than this are treated as transport failures.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,

    #[serde(default = "default_list_limit")]
    pub max_default_applications: usize,

    #[serde(default = "default_list_limit")]
    pub max_supported_origins: usize,

    #[serde(default = "default_list_limit")]
    pub max_related_applications: usize,

    /// User agent sent by the HTTP transport.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// App-store billing method URLs mapped to the store's package id.
    /// A configured table replaces the default one.
    #[serde(default = "default_app_stores")]
    pub app_stores: BTreeMap<String, String>,
}

fn default_manifest_path() -> String {
    "/payment-manifest.json".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_manifest_bytes() -> usize {
    1024 * 1024
}

fn default_list_limit() -> usize {
    100
}

fn default_user_agent() -> String {
    concat!("payment-app-finder/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_app_stores() -> BTreeMap<String, String> {
    BTreeMap::from([(
        GOOGLE_PLAY_BILLING.to_string(),
        GOOGLE_PLAY_PACKAGE.to_string(),
    )])
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            allow_http: false,
            manifest_path: default_manifest_path(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_manifest_bytes: default_max_manifest_bytes(),
            max_default_applications: default_list_limit(),
            max_supported_origins: default_list_limit(),
            max_related_applications: default_list_limit(),
            user_agent: default_user_agent(),
            app_stores: default_app_stores(),
        }
    }
}

impl FinderConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Builder-style override used by tests and the CLI.
    pub fn with_allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.manifest_path.starts_with('/') {
            return Err(FinderError::Config(format!(
                "manifest_path must be absolute, got {:?}",
                self.manifest_path
            )));
        }
        if self.max_manifest_bytes == 0 {
            return Err(FinderError::Config(
                "max_manifest_bytes must be positive".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(FinderError::Config(
                "fetch_timeout_secs must be positive".to_string(),
            ));
        }
        for (method, package) in &self.app_stores {
            url::Url::parse(method)
                .map_err(|e| FinderError::Config(format!("app store method {method:?}: {e}")))?;
            if package.is_empty() {
                return Err(FinderError::Config(format!(
                    "app store method {method:?} has no store package"
                )));
            }
        }
        Ok(())
    }
}
