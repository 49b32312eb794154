use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Origin, Url};

/// Non-URL payment method names defined by the W3C. Anything else that is not
/// a URL is dropped by the classifier.
pub const STANDARDIZED_METHODS: [&str; 5] = [
    "basic-card",
    "interledger",
    "payee-credit-transfer",
    "payer-credit-transfer",
    "tokenized-card",
];

/// A classified payment method identifier.
///
/// URL identifiers are kept in their parsed (normalized) form, so two raw
/// strings that differ only in host case or an implicit root path compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodIdentifier {
    Standardized(String),
    Url(Url),
}

impl MethodIdentifier {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Standardized(name) => name,
            Self::Url(url) => url.as_str(),
        }
    }

    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Url(url) => Some(url),
            Self::Standardized(_) => None,
        }
    }

    /// The origin a URL method names. Standardized methods have none.
    pub fn origin(&self) -> Option<Origin> {
        self.url().map(Url::origin)
    }
}

impl fmt::Display for MethodIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MethodIdentifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Why a raw method string was dropped. Never surfaced to the merchant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MethodRejection {
    #[error("unknown non-URL payment method name")]
    UnknownName,
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("URL scheme {0:?} is not permitted")]
    DisallowedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("URL carries credentials")]
    Credentials,
}

/// Decides which absolute URLs may name a payment method or a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    allow_http: bool,
}

impl UrlPolicy {
    pub fn new(allow_http: bool) -> Self {
        Self { allow_http }
    }

    pub fn check(&self, url: &Url) -> Result<(), MethodRejection> {
        let host = url.host().ok_or(MethodRejection::MissingHost)?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_http || is_loopback(&host) => {}
            other => return Err(MethodRejection::DisallowedScheme(other.to_string())),
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(MethodRejection::Credentials);
        }
        Ok(())
    }
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(addr) => *addr == Ipv4Addr::LOCALHOST,
        Host::Ipv6(addr) => *addr == Ipv6Addr::LOCALHOST,
    }
}

/// Splits merchant-supplied method strings into standardized names and URL methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodClassifier {
    policy: UrlPolicy,
}

impl MethodClassifier {
    pub fn new(policy: UrlPolicy) -> Self {
        Self { policy }
    }

    pub fn classify(&self, raw: &str) -> Result<MethodIdentifier, MethodRejection> {
        if STANDARDIZED_METHODS.contains(&raw) {
            return Ok(MethodIdentifier::Standardized(raw.to_string()));
        }
        let url = match Url::parse(raw) {
            Ok(url) => url,
            // A bare token such as "not-supported" parses as a relative reference.
            Err(url::ParseError::RelativeUrlWithoutBase) if !raw.contains('/') => {
                return Err(MethodRejection::UnknownName);
            }
            Err(e) => return Err(e.into()),
        };
        self.policy.check(&url)?;
        Ok(MethodIdentifier::Url(url))
    }

    /// Classifies every raw string, dropping rejects with a debug log.
    pub fn classify_all<'a, I>(&self, raw: I) -> Vec<MethodIdentifier>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut methods: Vec<MethodIdentifier> = raw
            .into_iter()
            .filter_map(|candidate| match self.classify(candidate) {
                Ok(method) => Some(method),
                Err(reason) => {
                    tracing::debug!(method = candidate, %reason, "dropping payment method");
                    None
                }
            })
            .collect();
        methods.sort();
        methods.dedup();
        methods
    }
}
