use super::fingerprint::Sha256Digest;
use std::collections::{BTreeSet, HashSet};
use url::{Origin, Url};

/// Which origins may self-declare support for a URL payment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportedOrigins {
    Enumerated(HashSet<Origin>),
    AllOrigins,
}

impl SupportedOrigins {
    pub fn none() -> Self {
        Self::Enumerated(HashSet::new())
    }

    pub fn contains(&self, origin: &Origin) -> bool {
        match self {
            Self::AllOrigins => true,
            Self::Enumerated(origins) => origins.contains(origin),
        }
    }
}

/// Decoded `payment-manifest.json` of one URL payment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethodManifest {
    pub default_application_uris: Vec<Url>,
    pub supported_origins: SupportedOrigins,
}

/// One `play` entry of a web app manifest's `related_applications`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAppManifestSection {
    pub package_id: String,
    pub min_version: i64,
    pub fingerprints: BTreeSet<Sha256Digest>,
}

/// Result of resolving one payment method manifest chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOutcome {
    Authorized {
        default_app_rules: Vec<WebAppManifestSection>,
        supported_origins: SupportedOrigins,
    },
    Unresolvable,
}

impl ManifestOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_authorized_outcome_is_resolved() {
        let authorized = ManifestOutcome::Authorized {
            default_app_rules: Vec::new(),
            supported_origins: SupportedOrigins::AllOrigins,
        };
        assert!(authorized.is_resolved());
        assert!(!ManifestOutcome::Unresolvable.is_resolved());
    }
}
