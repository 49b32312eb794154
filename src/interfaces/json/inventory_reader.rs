use crate::domain::app::{AppMetadata, InstalledApp};
use crate::domain::ports::AppInventory;
use crate::error::{FinderError, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInstalledApp {
    package_id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    version: i64,
    /// Hex-encoded raw signing certificates.
    #[serde(default)]
    signatures: Vec<String>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    ready_to_pay_service: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetadata {
    #[serde(default)]
    default_method: String,
    #[serde(default)]
    supported_methods: Vec<String>,
    #[serde(default)]
    supported_delegations: Vec<String>,
}

impl TryFrom<RawInstalledApp> for InstalledApp {
    type Error = FinderError;

    fn try_from(raw: RawInstalledApp) -> Result<Self> {
        let mut app = InstalledApp::new(raw.package_id, raw.label, raw.version);
        for signature in &raw.signatures {
            let certificate = hex::decode(signature).map_err(|e| {
                FinderError::Inventory(format!(
                    "{}: bad signature {signature:?}: {e}",
                    app.package_id
                ))
            })?;
            app = app.with_certificate(&certificate);
        }
        app.metadata = raw.metadata.map(|m| AppMetadata {
            default_method: m.default_method,
            supported_methods: m.supported_methods,
            supported_delegations: m.supported_delegations,
        });
        app.has_ready_to_pay_service = raw.ready_to_pay_service;
        Ok(app)
    }
}

/// Reads an installed-app inventory from a JSON array.
///
/// Each record carries the package id, label, version, hex-encoded signing
/// certificates, optional payment metadata and whether the app exposes a
/// ready-to-pay service.
pub struct InventoryReader<R: Read> {
    source: R,
}

impl<R: Read> InventoryReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn apps(self) -> Result<Vec<InstalledApp>> {
        let raw: Vec<RawInstalledApp> = serde_json::from_reader(self.source)?;
        raw.into_iter().map(InstalledApp::try_from).collect()
    }
}

/// An [`AppInventory`] backed by a JSON file, re-read on every snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileInventory {
    path: PathBuf,
}

impl JsonFileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AppInventory for JsonFileInventory {
    fn installed_apps(&self) -> Result<Vec<InstalledApp>> {
        let file = File::open(&self.path)?;
        InventoryReader::new(BufReader::new(file)).apps()
    }
}
