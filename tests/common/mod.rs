#![allow(dead_code)]

use async_trait::async_trait;
use payment_app_finder::application::finder::PaymentAppFinder;
use payment_app_finder::config::FinderConfig;
use payment_app_finder::domain::app::InstalledApp;
use payment_app_finder::domain::fingerprint::Sha256Digest;
use payment_app_finder::domain::ports::ManifestTransport;
use payment_app_finder::error::Result;
use payment_app_finder::infrastructure::in_memory::{InMemoryInventory, InMemoryTransport};
use payment_app_finder::infrastructure::json_decoder::JsonManifestDecoder;
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use url::Url;

pub const BOBPAY_CERT: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x00];
pub const ALICEPAY_CERT: &[u8] = &[0xAB, 0xCD, 0xEF, 0xAB, 0xCD, 0xEF, 0xAB, 0xCD, 0xEF, 0xAB];
pub const DAVEPAY_PROD_CERT: &[u8] = &[0x44, 0x44, 0x44, 0x44, 0x44, 0x22, 0x22, 0x22, 0x22, 0x22];
pub const DAVEPAY_DEV_CERT: &[u8] = &[0x44, 0x44, 0x44, 0x44, 0x44, 0x11, 0x11, 0x11, 0x11, 0x11];
pub const EVEPAY_CERT_1: &[u8] = &[0x55, 0x55, 0x55, 0x55, 0x55, 0x11, 0x11, 0x11, 0x11, 0x11];
pub const EVEPAY_CERT_2: &[u8] = &[0x55, 0x55, 0x55, 0x55, 0x55, 0x22, 0x22, 0x22, 0x22, 0x22];
pub const IKEPAY_CERT: &[u8] = &[0x66, 0x66, 0x66, 0x66, 0x66, 0x11, 0x11, 0x11, 0x11, 0x11];

pub fn fingerprint(certificate: &[u8]) -> String {
    Sha256Digest::from_certificate(certificate).to_string()
}

/// A web app manifest with a single `play` entry.
pub fn app_manifest(package: &str, min_version: i64, certificates: &[&[u8]]) -> String {
    let fingerprints: Vec<String> = certificates
        .iter()
        .map(|c| format!(r#"{{"type": "sha256_cert", "value": "{}"}}"#, fingerprint(c)))
        .collect();
    format!(
        r#"{{"related_applications": [{{"platform": "play", "id": "{package}",
            "min_version": "{min_version}", "fingerprints": [{}]}}]}}"#,
        fingerprints.join(", ")
    )
}

pub fn payment_app(
    package: &str,
    version: i64,
    certificate: &[u8],
    default_method: &str,
) -> InstalledApp {
    InstalledApp::new(package, package.to_uppercase(), version)
        .with_certificate(certificate)
        .with_default_method(default_method)
}

pub fn config() -> FinderConfig {
    FinderConfig::default()
}

pub fn finder_with(
    transport: Arc<dyn ManifestTransport>,
    apps: Vec<InstalledApp>,
) -> PaymentAppFinder {
    finder_with_config(transport, apps, config())
}

pub fn finder_with_config(
    transport: Arc<dyn ManifestTransport>,
    apps: Vec<InstalledApp>,
    config: FinderConfig,
) -> PaymentAppFinder {
    PaymentAppFinder::new(
        transport,
        Arc::new(JsonManifestDecoder::new(&config)),
        Arc::new(InMemoryInventory::new(apps)),
        config,
    )
}

pub fn finder(transport: &InMemoryTransport, apps: Vec<InstalledApp>) -> PaymentAppFinder {
    finder_with(Arc::new(transport.clone()), apps)
}

/// Holds every fetch until the test releases it.
#[derive(Clone)]
pub struct GatedTransport {
    inner: InMemoryTransport,
    started: Arc<Notify>,
    gate: Arc<Semaphore>,
}

impl GatedTransport {
    pub fn new(inner: InMemoryTransport) -> Self {
        Self {
            inner,
            started: Arc::new(Notify::new()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Resolves once some fetch is waiting at the gate.
    pub async fn fetch_started(&self) {
        self.started.notified().await;
    }

    pub fn release_all(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl ManifestTransport for GatedTransport {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        self.started.notify_one();
        let _permit = self.gate.acquire().await;
        self.inner.fetch(url).await
    }
}
