use crate::config::FinderConfig;
use crate::domain::fingerprint::Sha256Digest;
use crate::domain::manifest::{PaymentMethodManifest, SupportedOrigins, WebAppManifestSection};
use crate::domain::method::UrlPolicy;
use crate::domain::ports::ManifestDecoder;
use crate::error::{FinderError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use url::{Origin, Url};

#[derive(Debug, Deserialize)]
struct RawPaymentMethodManifest {
    #[serde(default)]
    default_applications: Option<Vec<String>>,
    #[serde(default)]
    supported_origins: Option<RawSupportedOrigins>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSupportedOrigins {
    Wildcard(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawWebAppManifest {
    related_applications: Vec<RawRelatedApplication>,
}

#[derive(Debug, Deserialize)]
struct RawRelatedApplication {
    platform: Option<String>,
    id: Option<String>,
    min_version: Option<String>,
    fingerprints: Option<Vec<RawFingerprint>>,
}

#[derive(Debug, Deserialize)]
struct RawFingerprint {
    r#type: Option<String>,
    value: Option<String>,
}

/// Decodes payment method and web app manifests from their JSON wire format.
///
/// Parsing runs on the blocking pool so untrusted documents never tie up the
/// async workers.
#[derive(Debug, Clone, Copy)]
pub struct JsonManifestDecoder {
    policy: UrlPolicy,
    max_default_applications: usize,
    max_supported_origins: usize,
    max_related_applications: usize,
}

impl JsonManifestDecoder {
    pub fn new(config: &FinderConfig) -> Self {
        Self {
            policy: UrlPolicy::new(config.allow_http),
            max_default_applications: config.max_default_applications,
            max_supported_origins: config.max_supported_origins,
            max_related_applications: config.max_related_applications,
        }
    }

    pub fn parse_payment_method_manifest(
        &self,
        manifest_url: &Url,
        bytes: &[u8],
    ) -> Result<PaymentMethodManifest> {
        let raw: RawPaymentMethodManifest = serde_json::from_slice(bytes)?;
        if raw.default_applications.is_none() && raw.supported_origins.is_none() {
            return Err(FinderError::Decode(
                "payment method manifest names neither default applications nor supported origins"
                    .to_string(),
            ));
        }

        let entries = raw.default_applications.unwrap_or_default();
        if entries.len() > self.max_default_applications {
            return Err(FinderError::Decode(format!(
                "{} default applications exceed the limit of {}",
                entries.len(),
                self.max_default_applications
            )));
        }
        let default_application_uris = entries
            .iter()
            .map(|entry| {
                let url = manifest_url.join(entry)?;
                self.policy.check(&url).map_err(|reason| {
                    FinderError::Decode(format!("default application {entry:?}: {reason}"))
                })?;
                Ok(url)
            })
            .collect::<Result<Vec<Url>>>()?;

        let supported_origins = match raw.supported_origins {
            None => SupportedOrigins::none(),
            Some(RawSupportedOrigins::Wildcard(value)) if value == "*" => {
                SupportedOrigins::AllOrigins
            }
            Some(RawSupportedOrigins::Wildcard(value)) => {
                return Err(FinderError::Decode(format!(
                    "supported_origins must be \"*\" or a list, got {value:?}"
                )));
            }
            Some(RawSupportedOrigins::List(list)) => {
                if list.len() > self.max_supported_origins {
                    return Err(FinderError::Decode(format!(
                        "{} supported origins exceed the limit of {}",
                        list.len(),
                        self.max_supported_origins
                    )));
                }
                let origins = list
                    .iter()
                    .map(|entry| self.parse_origin(entry))
                    .collect::<Result<HashSet<Origin>>>()?;
                SupportedOrigins::Enumerated(origins)
            }
        };

        Ok(PaymentMethodManifest {
            default_application_uris,
            supported_origins,
        })
    }

    pub fn parse_web_app_manifest(&self, bytes: &[u8]) -> Result<Vec<WebAppManifestSection>> {
        let raw: RawWebAppManifest = serde_json::from_slice(bytes)?;
        if raw.related_applications.len() > self.max_related_applications {
            return Err(FinderError::Decode(format!(
                "{} related applications exceed the limit of {}",
                raw.related_applications.len(),
                self.max_related_applications
            )));
        }
        raw.related_applications
            .into_iter()
            .filter(|entry| entry.platform.as_deref() == Some("play"))
            .map(parse_section)
            .collect()
    }

    fn parse_origin(&self, entry: &str) -> Result<Origin> {
        let url = Url::parse(entry)?;
        self.policy.check(&url).map_err(|reason| {
            FinderError::Decode(format!("supported origin {entry:?}: {reason}"))
        })?;
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(FinderError::Decode(format!(
                "supported origin {entry:?} must not carry a path, query or fragment"
            )));
        }
        Ok(url.origin())
    }
}

fn parse_section(entry: RawRelatedApplication) -> Result<WebAppManifestSection> {
    let package_id = entry
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| FinderError::Decode("related application without an id".to_string()))?;
    let min_version = entry
        .min_version
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            FinderError::Decode(format!("{package_id}: min_version must be an integer string"))
        })?;

    let raw_fingerprints = entry.fingerprints.unwrap_or_default();
    if raw_fingerprints.is_empty() {
        return Err(FinderError::Decode(format!("{package_id}: no fingerprints")));
    }
    let fingerprints = raw_fingerprints
        .into_iter()
        .map(|fingerprint| {
            if fingerprint.r#type.as_deref() != Some("sha256_cert") {
                return Err(FinderError::Decode(format!(
                    "{package_id}: unsupported fingerprint type {:?}",
                    fingerprint.r#type
                )));
            }
            fingerprint
                .value
                .as_deref()
                .unwrap_or_default()
                .parse::<Sha256Digest>()
                .map_err(|e| FinderError::Decode(format!("{package_id}: {e}")))
        })
        .collect::<Result<BTreeSet<Sha256Digest>>>()?;

    Ok(WebAppManifestSection {
        package_id,
        min_version,
        fingerprints,
    })
}

#[async_trait]
impl ManifestDecoder for JsonManifestDecoder {
    async fn decode_payment_method_manifest(
        &self,
        manifest_url: &Url,
        bytes: Vec<u8>,
    ) -> Result<PaymentMethodManifest> {
        let decoder = *self;
        let manifest_url = manifest_url.clone();
        tokio::task::spawn_blocking(move || {
            decoder.parse_payment_method_manifest(&manifest_url, &bytes)
        })
        .await
        .map_err(|e| FinderError::Decode(format!("decoder task failed: {e}")))?
    }

    async fn decode_web_app_manifest(&self, bytes: Vec<u8>) -> Result<Vec<WebAppManifestSection>> {
        let decoder = *self;
        tokio::task::spawn_blocking(move || decoder.parse_web_app_manifest(&bytes))
            .await
            .map_err(|e| FinderError::Decode(format!("decoder task failed: {e}")))?
    }
}
