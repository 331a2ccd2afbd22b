//! HTTP-backed remote stores

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::common::RemoteStore;
use crate::error::{Result, TilerError};
use crate::models::SlideReference;

/// Fetches `reference.remote_url` with a blocking HTTP client
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::blocking::Client,
}

impl HttpStore {
    /// Create a store whose requests time out after `timeout_secs`
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TilerError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn get(&self, sample_id: &str, url: &str, sink: &mut dyn Write) -> Result<u64> {
        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TilerError::TransferFailure {
                sample_id: sample_id.to_string(),
                reason: format!("HTTP {status} from {url}"),
            });
        }
        response
            .copy_to(sink)
            .map_err(|e| TilerError::TransferFailure {
                sample_id: sample_id.to_string(),
                reason: format!("body of {url} interrupted: {e}"),
            })
    }
}

impl RemoteStore for HttpStore {
    fn fetch(&self, reference: &SlideReference, sink: &mut dyn Write) -> Result<u64> {
        self.get(&reference.sample_id, &reference.remote_url, sink)
    }
}

/// One registry entry: where a sample lives and what it should hash to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Download URL
    pub url: String,
    /// Expected SHA-256 (hex)
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Remote store driven by an explicit sample id → URL registry
///
/// Samples missing from the registry fail without touching the network.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    http: HttpStore,
    entries: FxHashMap<String, RegistryEntry>,
}

impl RegistryStore {
    /// Create a store over `entries`
    #[must_use]
    pub const fn new(http: HttpStore, entries: FxHashMap<String, RegistryEntry>) -> Self {
        Self { http, entries }
    }

    /// Load a registry from a JSON object keyed by sample id
    pub fn from_json_file(path: &Path, http: HttpStore) -> Result<Self> {
        let file = crate::error::util::safe_open_file(path, "slide registry")?;
        let entries: FxHashMap<String, RegistryEntry> =
            serde_json::from_reader(std::io::BufReader::new(file))?;
        log::info!("Loaded {} registry entries from {}", entries.len(), path.display());
        Ok(Self::new(http, entries))
    }

    /// Number of registered samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RemoteStore for RegistryStore {
    fn fetch(&self, reference: &SlideReference, sink: &mut dyn Write) -> Result<u64> {
        let entry = self.entries.get(&reference.sample_id).ok_or_else(|| {
            TilerError::TransferFailure {
                sample_id: reference.sample_id.clone(),
                reason: "sample is not in the registry".to_string(),
            }
        })?;
        self.http.get(&reference.sample_id, &entry.url, sink)
    }

    fn expected_sha256(&self, sample_id: &str) -> Option<String> {
        self.entries.get(sample_id).and_then(|entry| entry.sha256.clone())
    }
}
