//! Manifest fetch/parse pipeline.
//!
//! Resolves a URL payment method into a [`ManifestOutcome`]: fetch the
//! method's payment method manifest, decode it, then fetch and decode every
//! referenced web app manifest concurrently. One pipeline serves one query and
//! deduplicates all work by document URL.

use super::cancel::CancellationToken;
use crate::config::FinderConfig;
use crate::domain::manifest::{ManifestOutcome, WebAppManifestSection};
use crate::domain::method::UrlPolicy;
use crate::domain::ports::{DecoderRef, TransportRef};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

/// Concurrency-safe memo keyed by document URL.
///
/// Concurrent requests for the same URL share a single resolution.
struct DedupCache<T> {
    entries: Mutex<HashMap<Url, Arc<OnceCell<T>>>>,
}

impl<T: Clone> DedupCache<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get_or_resolve<F, Fut>(&self, url: &Url, resolve: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(url.clone()).or_default())
        };
        cell.get_or_init(resolve).await.clone()
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

struct PipelineInner {
    transport: TransportRef,
    decoder: DecoderRef,
    policy: UrlPolicy,
    manifest_path: String,
    cancel: CancellationToken,
    method_manifests: DedupCache<Arc<ManifestOutcome>>,
    web_app_manifests: DedupCache<Arc<Vec<WebAppManifestSection>>>,
}

/// Cheap to clone; clones share the same caches.
#[derive(Clone)]
pub struct ManifestPipeline {
    inner: Arc<PipelineInner>,
}

impl ManifestPipeline {
    pub fn new(
        transport: TransportRef,
        decoder: DecoderRef,
        config: &FinderConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                transport,
                decoder,
                policy: UrlPolicy::new(config.allow_http),
                manifest_path: config.manifest_path.clone(),
                cancel,
                method_manifests: DedupCache::new(),
                web_app_manifests: DedupCache::new(),
            }),
        }
    }

    /// Location of the payment method manifest for a URL method.
    pub fn manifest_url(&self, method: &Url) -> Option<Url> {
        method.join(&self.inner.manifest_path).ok()
    }

    /// Resolves a URL method. Methods sharing a manifest share one resolution.
    pub async fn resolve(&self, method: &Url) -> Arc<ManifestOutcome> {
        let Some(manifest_url) = self.manifest_url(method) else {
            warn!(method = %method, "cannot derive payment method manifest URL");
            return Arc::new(ManifestOutcome::Unresolvable);
        };
        self.resolve_manifest(&manifest_url).await
    }

    pub async fn resolve_manifest(&self, manifest_url: &Url) -> Arc<ManifestOutcome> {
        self.inner
            .method_manifests
            .get_or_resolve(manifest_url, || self.load_method_manifest(manifest_url))
            .await
    }

    /// Number of distinct payment method manifests touched so far.
    pub async fn resolved_manifest_count(&self) -> usize {
        self.inner.method_manifests.len().await
    }

    async fn load_method_manifest(&self, manifest_url: &Url) -> Arc<ManifestOutcome> {
        let Some(bytes) = self.fetch(manifest_url).await else {
            return Arc::new(ManifestOutcome::Unresolvable);
        };
        let manifest = match self
            .inner
            .decoder
            .decode_payment_method_manifest(manifest_url, bytes)
            .await
        {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(url = %manifest_url, error = %e, "payment method manifest rejected");
                return Arc::new(ManifestOutcome::Unresolvable);
            }
        };

        let mut tasks = JoinSet::new();
        for (index, app_url) in manifest.default_application_uris.into_iter().enumerate() {
            let pipeline = self.clone();
            tasks.spawn(async move { (index, pipeline.web_app_sections(&app_url).await) });
        }

        let mut documents = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(document) => documents.push(document),
                Err(e) => warn!(url = %manifest_url, error = %e, "web app manifest task failed"),
            }
        }
        documents.sort_by_key(|(index, _)| *index);

        let default_app_rules: Vec<WebAppManifestSection> = documents
            .iter()
            .flat_map(|(_, sections)| sections.iter().cloned())
            .collect();
        debug!(
            url = %manifest_url,
            rules = default_app_rules.len(),
            "payment method manifest resolved"
        );
        Arc::new(ManifestOutcome::Authorized {
            default_app_rules,
            supported_origins: manifest.supported_origins,
        })
    }

    /// Failed documents contribute no sections.
    async fn web_app_sections(&self, url: &Url) -> Arc<Vec<WebAppManifestSection>> {
        self.inner
            .web_app_manifests
            .get_or_resolve(url, || async {
                let Some(bytes) = self.fetch(url).await else {
                    return Arc::new(Vec::new());
                };
                match self.inner.decoder.decode_web_app_manifest(bytes).await {
                    Ok(sections) => Arc::new(sections),
                    Err(e) => {
                        warn!(url = %url, error = %e, "web app manifest rejected");
                        Arc::new(Vec::new())
                    }
                }
            })
            .await
    }

    async fn fetch(&self, url: &Url) -> Option<Vec<u8>> {
        if self.inner.cancel.is_cancelled() {
            return None;
        }
        if let Err(reason) = self.inner.policy.check(url) {
            warn!(url = %url, %reason, "refusing to fetch manifest");
            return None;
        }
        match self.inner.transport.fetch(url).await {
            Ok(_) if self.inner.cancel.is_cancelled() => None,
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(url = %url, error = %e, "manifest fetch failed");
                None
            }
        }
    }
}
