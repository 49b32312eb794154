use super::fingerprint::Sha256Digest;
use super::method::{MethodClassifier, MethodIdentifier};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use url::Origin;

/// Payment metadata an installed app declares about itself.
///
/// All values are untrusted raw strings exactly as the app ships them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppMetadata {
    /// The app's own payment method. May be empty.
    pub default_method: String,
    /// Additional method names the app claims to handle.
    pub supported_methods: Vec<String>,
    pub supported_delegations: Vec<String>,
}

/// An application from the device's installed-app inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    pub package_id: String,
    pub label: String,
    pub version: i64,
    pub signing_fingerprints: BTreeSet<Sha256Digest>,
    /// `None` when the app ships no payment metadata at all.
    pub metadata: Option<AppMetadata>,
    pub has_ready_to_pay_service: bool,
}

impl InstalledApp {
    pub fn new(package_id: impl Into<String>, label: impl Into<String>, version: i64) -> Self {
        Self {
            package_id: package_id.into(),
            label: label.into(),
            version,
            signing_fingerprints: BTreeSet::new(),
            metadata: None,
            has_ready_to_pay_service: false,
        }
    }

    /// Adds the digest of a raw signing certificate.
    pub fn with_certificate(mut self, certificate: &[u8]) -> Self {
        self.signing_fingerprints
            .insert(Sha256Digest::from_certificate(certificate));
        self
    }

    pub fn with_default_method(mut self, method: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(AppMetadata::default).default_method = method.into();
        self
    }

    pub fn with_supported_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata
            .get_or_insert_with(AppMetadata::default)
            .supported_methods
            .extend(methods.into_iter().map(Into::into));
        self
    }

    pub fn with_delegations<I, S>(mut self, delegations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata
            .get_or_insert_with(AppMetadata::default)
            .supported_delegations
            .extend(delegations.into_iter().map(Into::into));
        self
    }

    pub fn with_ready_to_pay_service(mut self) -> Self {
        self.has_ready_to_pay_service = true;
        self
    }
}

/// Payer data an app can collect on the merchant's behalf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Delegations {
    pub shipping_address: bool,
    pub payer_name: bool,
    pub payer_email: bool,
    pub payer_phone: bool,
}

impl Delegations {
    /// Unknown values are ignored.
    pub fn parse<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut delegations = Self::default();
        for value in values {
            match value {
                "shippingAddress" => delegations.shipping_address = true,
                "payerName" => delegations.payer_name = true,
                "payerEmail" => delegations.payer_email = true,
                "payerPhone" => delegations.payer_phone = true,
                other => tracing::debug!(delegation = other, "ignoring unknown delegation"),
            }
        }
        delegations
    }
}

/// Why an installed app can never be authorized for anything.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    #[error("app has no human-readable label")]
    EmptyLabel,
    #[error("app ships no payment metadata")]
    NoMetadata,
    #[error("app metadata names no payment method")]
    NoMethodNames,
    #[error("app has no signing certificate")]
    Unsigned,
}

/// An installed app that passed the baseline metadata filter, with its
/// declared method names classified.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub app: Arc<InstalledApp>,
    /// The classified default method, when it is a usable identifier.
    pub default_method: Option<MethodIdentifier>,
    pub declared_methods: BTreeSet<MethodIdentifier>,
    pub delegations: Delegations,
}

impl Candidate {
    pub fn screen(app: InstalledApp, classifier: &MethodClassifier) -> Result<Self, Exclusion> {
        if app.label.trim().is_empty() {
            return Err(Exclusion::EmptyLabel);
        }
        let metadata = app.metadata.as_ref().ok_or(Exclusion::NoMetadata)?;
        if metadata.default_method.is_empty() && metadata.supported_methods.is_empty() {
            return Err(Exclusion::NoMethodNames);
        }
        if app.signing_fingerprints.is_empty() {
            return Err(Exclusion::Unsigned);
        }

        let default_method = if metadata.default_method.is_empty() {
            None
        } else {
            classifier.classify(&metadata.default_method).ok()
        };
        let declared_methods = default_method
            .iter()
            .cloned()
            .chain(
                metadata
                    .supported_methods
                    .iter()
                    .filter_map(|raw| classifier.classify(raw).ok()),
            )
            .collect();
        let delegations =
            Delegations::parse(metadata.supported_delegations.iter().map(String::as_str));

        Ok(Self {
            app: Arc::new(app),
            default_method,
            declared_methods,
            delegations,
        })
    }

    pub fn package_id(&self) -> &str {
        &self.app.package_id
    }

    pub fn declares(&self, method: &MethodIdentifier) -> bool {
        self.declared_methods.contains(method)
    }

    /// The origin the app claims for itself through its default method.
    /// Only meaningful once verified against that origin's own manifest.
    pub fn claimed_origin(&self) -> Option<Origin> {
        self.default_method.as_ref().and_then(MethodIdentifier::origin)
    }
}

/// An app together with the exact subset of requested methods it may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedApp {
    pub app: Arc<InstalledApp>,
    pub methods: BTreeSet<MethodIdentifier>,
    pub delegations: Delegations,
}

impl AuthorizedApp {
    pub fn package_id(&self) -> &str {
        &self.app.package_id
    }

    pub fn method_names(&self) -> BTreeSet<&str> {
        self.methods.iter().map(MethodIdentifier::as_str).collect()
    }
}
