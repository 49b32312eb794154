use crate::domain::app::{AuthorizedApp, InstalledApp};
use crate::domain::ports::{AppInventory, ManifestTransport, ResultSink};
use crate::error::{FinderError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock as StdRwLock};
use tokio::sync::RwLock;
use url::Url;

/// A thread-safe in-memory manifest server.
///
/// Uses `Arc<RwLock<HashMap<String, Vec<u8>>>>` so clones serve the same
/// documents. Every fetch is logged, which lets tests assert deduplication.
#[derive(Default, Clone)]
pub struct InMemoryTransport {
    documents: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fetches: Arc<RwLock<HashMap<String, usize>>>,
}

impl InMemoryTransport {
    /// Creates a new, empty in-memory transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` at `url` from now on.
    pub async fn insert(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.documents
            .write()
            .await
            .insert(url.to_string(), body.into());
    }

    /// How many times `url` was fetched, successful or not.
    pub async fn fetch_count(&self, url: &str) -> usize {
        self.fetches.read().await.get(url).copied().unwrap_or(0)
    }

    pub async fn total_fetches(&self) -> usize {
        self.fetches.read().await.values().sum()
    }
}

#[async_trait]
impl ManifestTransport for InMemoryTransport {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        *self
            .fetches
            .write()
            .await
            .entry(url.as_str().to_string())
            .or_default() += 1;
        let documents = self.documents.read().await;
        documents
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FinderError::Transport {
                url: url.to_string(),
                reason: "not found".to_string(),
            })
    }
}

/// A fixed, replaceable list of installed apps.
#[derive(Default, Clone)]
pub struct InMemoryInventory {
    apps: Arc<StdRwLock<Vec<InstalledApp>>>,
}

impl InMemoryInventory {
    pub fn new(apps: Vec<InstalledApp>) -> Self {
        Self {
            apps: Arc::new(StdRwLock::new(apps)),
        }
    }

    /// Replaces the inventory. Queries already past their snapshot are unaffected.
    pub fn replace(&self, apps: Vec<InstalledApp>) -> Result<()> {
        let mut guard = self
            .apps
            .write()
            .map_err(|_| FinderError::Inventory("inventory lock poisoned".to_string()))?;
        *guard = apps;
        Ok(())
    }
}

impl AppInventory for InMemoryInventory {
    fn installed_apps(&self) -> Result<Vec<InstalledApp>> {
        self.apps
            .read()
            .map(|apps| apps.clone())
            .map_err(|_| FinderError::Inventory("inventory lock poisoned".to_string()))
    }
}

/// Records everything a query emits, for inspection after the fact.
#[derive(Debug, Default)]
pub struct CollectingSink {
    apps: Mutex<Vec<AuthorizedApp>>,
    completions: Mutex<usize>,
    /// Apps that arrived after the completion signal.
    late: Mutex<usize>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apps(&self) -> Vec<AuthorizedApp> {
        self.apps.lock().map(|apps| apps.clone()).unwrap_or_default()
    }

    pub fn completions(&self) -> usize {
        self.completions.lock().map(|n| *n).unwrap_or_default()
    }

    pub fn late_apps(&self) -> usize {
        self.late.lock().map(|n| *n).unwrap_or_default()
    }
}

impl ResultSink for CollectingSink {
    fn app_authorized(&self, app: AuthorizedApp) {
        if self.completions() > 0
            && let Ok(mut late) = self.late.lock()
        {
            *late += 1;
        }
        if let Ok(mut apps) = self.apps.lock() {
            apps.push(app);
        }
    }

    fn resolution_complete(&self) {
        if let Ok(mut completions) = self.completions.lock() {
            *completions += 1;
        }
    }
}
