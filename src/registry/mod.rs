// src/registry/mod.rs

//! Registry client: remote catalog retrieval and validated ingestion
//!
//! This module provides functionality for:
//! - Probing the remote store module entry point
//! - Listing the package catalog as validated descriptors
//! - Fetching per-package assets (payload, icon, banner)
//!
//! Every catalog and payload retrieval carries a cache-defeating query
//! token so a caching intermediary can never serve a stale document.

use crate::error::{Error, Result};
use crate::index::safe_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Production catalog host
pub const PRODUCTION_HOST: &str = "https://zeondev.github.io/Pluto-AppStore/";

/// Development catalog host
pub const DEV_HOST: &str = "http://localhost:3000/";

/// Entry-point manifest served at `{host}store.json`
const MODULE_MANIFEST: &str = "store.json";

/// Catalog listing served at `{host}pkgs/index.json`
const CATALOG_INDEX: &str = "pkgs/index.json";

/// Raw byte retrieval over the wire
///
/// The catalog handle fetches everything through this seam; tests and
/// offline use substitute [`MemoryTransport`].
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed transport with a fixed timeout
///
/// There are no retries anywhere in the engine: a failed fetch aborts the
/// current operation and the caller decides whether to re-invoke it.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::RegistryUnavailable(format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::AssetFetch(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::AssetFetch(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::AssetFetch(format!("reading body from {} failed: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// In-memory transport for tests and offline development
///
/// URLs are matched with their query string stripped, so cache-busted
/// requests resolve to the same entry. Every fetched URL is recorded for
/// assertions about request traffic.
#[derive(Default)]
pub struct MemoryTransport {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    requests: RwLock<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bytes served for a URL
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), body.into());
    }

    /// Forget a URL, making subsequent fetches fail
    pub fn remove(&self, url: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(url);
    }

    /// Every URL fetched so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        let key = url.split('?').next().unwrap_or(url);
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| Error::AssetFetch(format!("no entry for {}", key)))
    }
}

/// Which catalog host to talk to; selected by configuration, never probed
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub host: String,
}

impl RegistryConfig {
    pub fn production() -> Self {
        Self {
            host: PRODUCTION_HOST.to_string(),
        }
    }

    pub fn development() -> Self {
        Self {
            host: DEV_HOST.to_string(),
        }
    }

    /// A custom host; a trailing slash is appended if missing
    pub fn custom(host: impl Into<String>) -> Self {
        let mut host = host.into();
        if !host.ends_with('/') {
            host.push('/');
        }
        Self { host }
    }
}

/// Append a uniqueness token so intermediaries cannot serve stale content
fn cache_bust(url: &str) -> String {
    format!("{}?t={}", url, chrono::Utc::now().timestamp_millis())
}

/// Package asset locations within the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageAssets {
    /// Payload (package source) path relative to the package directory
    pub path: String,
    /// Icon path
    pub icon: String,
    /// Optional banner path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

/// One release in a package's version history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    #[serde(rename = "ver")]
    pub version: String,
    pub date: String,
}

/// One catalog entry, validated at ingestion and immutable for the session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    /// Catalog-unique id; may contain path separators ("games/chess")
    pub id: String,
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Platform version this package was built against
    pub compatible_with: f64,
    pub assets: PackageAssets,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
    #[serde(default)]
    pub latest_version_info: String,
}

impl PackageDescriptor {
    /// Storage key derived from the package id
    pub fn safe_key(&self) -> String {
        safe_key(&self.id)
    }

    /// Banner asset if present, otherwise the icon
    pub fn banner_or_icon(&self) -> &str {
        self.assets.banner.as_deref().unwrap_or(&self.assets.icon)
    }
}

/// Store module manifest served at the registry entry point
#[derive(Debug, Deserialize)]
struct ModuleManifest {
    #[serde(default)]
    api: Vec<String>,
}

/// Handle to a live catalog after a successful entry-point probe
#[derive(Clone)]
pub struct CatalogHandle {
    transport: Arc<dyn Transport>,
    config: RegistryConfig,
}

/// Retrieve and probe the remote store module, yielding a catalog handle
///
/// Fails with `RegistryUnavailable` when the entry point cannot be fetched,
/// is unreadable, or does not declare the `init` capability.
pub fn connect(transport: Arc<dyn Transport>, config: RegistryConfig) -> Result<CatalogHandle> {
    info!("Probing app store module at {}", config.host);

    let url = cache_bust(&format!("{}{}", config.host, MODULE_MANIFEST));
    let raw = transport
        .fetch(&url)
        .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;

    let manifest: ModuleManifest = serde_json::from_slice(&raw).map_err(|e| {
        Error::RegistryUnavailable(format!("store module manifest unreadable: {}", e))
    })?;

    if !manifest.api.iter().any(|capability| capability == "init") {
        return Err(Error::RegistryUnavailable(
            "store module does not expose init".to_string(),
        ));
    }

    Ok(CatalogHandle { transport, config })
}

impl CatalogHandle {
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Fetch the catalog and parse it into validated descriptors
    ///
    /// A malformed entry (missing id or assets, non-numeric compatibleWith)
    /// is skipped with a warning rather than failing the whole load. Two
    /// distinct ids collapsing to the same storage key fail the load: the
    /// key derivation must stay injective over the ids in use.
    pub fn list(&self) -> Result<Vec<PackageDescriptor>> {
        let url = cache_bust(&format!("{}{}", self.config.host, CATALOG_INDEX));
        let raw = self
            .transport
            .fetch(&url)
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;

        let entries: Vec<serde_json::Value> = serde_json::from_slice(&raw)
            .map_err(|e| Error::CatalogFormat(format!("catalog index unreadable: {}", e)))?;

        let mut descriptors = Vec::with_capacity(entries.len());
        let mut keys: HashMap<String, String> = HashMap::new();

        for entry in entries {
            let descriptor: PackageDescriptor = match serde_json::from_value(entry) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Skipping malformed catalog entry: {}", e);
                    continue;
                }
            };

            if let Some(other) = keys.insert(descriptor.safe_key(), descriptor.id.clone()) {
                return Err(Error::CatalogFormat(format!(
                    "ids '{}' and '{}' collapse to the same storage key",
                    other, descriptor.id
                )));
            }
            descriptors.push(descriptor);
        }

        info!("Catalog lists {} packages", descriptors.len());
        Ok(descriptors)
    }

    /// Fetch the catalog, keeping only entries in the given category
    pub fn list_category(&self, category: &str) -> Result<Vec<PackageDescriptor>> {
        let wanted = category.to_lowercase();
        let descriptors = self
            .list()?
            .into_iter()
            .filter(|d| d.category.to_lowercase() == wanted)
            .collect();
        Ok(descriptors)
    }

    /// URL of a package asset (payload, icon, banner)
    pub fn asset_url(&self, id: &str, asset: &str) -> String {
        format!("{}pkgs/{}/{}", self.config.host, id, asset)
    }

    /// Fetch a package's payload bytes, cache-busted
    pub fn fetch_payload(&self, descriptor: &PackageDescriptor) -> Result<Vec<u8>> {
        let url = cache_bust(&self.asset_url(&descriptor.id, &descriptor.assets.path));
        self.transport.fetch(&url)
    }

    /// Fetch a package's icon bytes
    pub fn fetch_icon(&self, descriptor: &PackageDescriptor) -> Result<Vec<u8>> {
        let url = self.asset_url(&descriptor.id, &descriptor.assets.icon);
        self.transport.fetch(&url)
    }
}
