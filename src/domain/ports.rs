use super::app::{AuthorizedApp, InstalledApp};
use super::manifest::{PaymentMethodManifest, WebAppManifestSection};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Fetches raw manifest documents. Caching and retries are the implementor's concern.
#[async_trait]
pub trait ManifestTransport: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Parses untrusted manifest bytes.
#[async_trait]
pub trait ManifestDecoder: Send + Sync {
    /// `manifest_url` is the document's own location; relative
    /// `default_applications` entries resolve against it.
    async fn decode_payment_method_manifest(
        &self,
        manifest_url: &Url,
        bytes: Vec<u8>,
    ) -> Result<PaymentMethodManifest>;

    async fn decode_web_app_manifest(&self, bytes: Vec<u8>) -> Result<Vec<WebAppManifestSection>>;
}

/// Enumerates locally installed payment apps.
pub trait AppInventory: Send + Sync {
    fn installed_apps(&self) -> Result<Vec<InstalledApp>>;
}

/// Receives the results of one query.
pub trait ResultSink: Send + Sync {
    fn app_authorized(&self, app: AuthorizedApp);
    /// Called exactly once, after every `app_authorized` of the query.
    fn resolution_complete(&self);
}

pub type TransportRef = Arc<dyn ManifestTransport>;
pub type DecoderRef = Arc<dyn ManifestDecoder>;
pub type InventoryRef = Arc<dyn AppInventory>;
