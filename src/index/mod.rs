// src/index/mod.rs

//! Local index store: the durable manifest of installed packages
//!
//! The manifest is one JSON document at a fixed path inside the persistent
//! store, mapping storage keys to installed records. Every mutation is a
//! full-document rewrite; there is no partial or append format, so the
//! persisted document is always a complete snapshot of the in-memory view.

use crate::error::{Error, Result};
use crate::registry::PackageDescriptor;
use crate::vfs::{PathKind, PersistentStore};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Folder holding installed payloads and the manifest
pub const REGISTRY_DIR: &str = "Registry/AppStore";

/// Fixed manifest path inside the persistent store
pub const INDEX_PATH: &str = "Registry/AppStore/_AppStoreIndex.json";

/// Derive the storage key for a package id
///
/// Path separators become "--" so the key is usable as a single path
/// component. Catalog ingestion rejects id sets in which two distinct ids
/// collapse to the same key, which keeps the transform injective over the
/// ids actually in use.
pub fn safe_key(id: &str) -> String {
    id.replace('/', "--")
}

/// Storage path of an installed payload
pub fn payload_path(key: &str) -> String {
    format!("{}/{}.app", REGISTRY_DIR, key)
}

/// Re-encode fetched icon bytes as an inline `data:` URL
///
/// The media type is guessed from the asset filename so the manifest stays
/// self-contained and renderable without further fetches.
pub fn inline_icon(asset_name: &str, bytes: &[u8]) -> String {
    let media_type = match asset_name.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    format!("data:{};base64,{}", media_type, BASE64.encode(bytes))
}

/// Manifest entry for one installed package
///
/// Snapshots the descriptor as it was at install time; the catalog may have
/// moved on since.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledRecord {
    pub safe_key: String,
    pub descriptor: PackageDescriptor,
    /// Icon as an inline data: URL
    pub icon: String,
}

/// In-memory view of the manifest
pub type LocalIndex = BTreeMap<String, InstalledRecord>;

/// Loads and persists the manifest as one whole JSON document
pub struct IndexStore {
    store: Arc<dyn PersistentStore>,
}

impl IndexStore {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// Create the backing folder if absent; idempotent
    pub fn ensure_container(&self) -> Result<()> {
        if self.store.what_is(REGISTRY_DIR)?.is_none() {
            self.store.create_folder(REGISTRY_DIR)?;
        }
        Ok(())
    }

    /// Load the manifest, or an empty index if none has been written yet
    pub fn load(&self) -> Result<LocalIndex> {
        match self.store.what_is(INDEX_PATH)? {
            Some(PathKind::File) => {
                let raw = self.store.read_file(INDEX_PATH)?;
                serde_json::from_str(&raw).map_err(|e| {
                    Error::Store(format!("manifest at {} is unreadable: {}", INDEX_PATH, e))
                })
            }
            _ => Ok(LocalIndex::new()),
        }
    }

    /// Persist the manifest, replacing the previous document entirely
    pub fn save(&self, index: &LocalIndex) -> Result<()> {
        self.ensure_container()?;
        let raw = serde_json::to_string(index)
            .map_err(|e| Error::Store(format!("failed to serialize manifest: {}", e)))?;
        self.store.write_file(INDEX_PATH, &raw)?;
        debug!("Persisted manifest with {} entries", index.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PackageAssets, VersionEntry};
    use crate::vfs::DiskStore;
    use tempfile::TempDir;

    fn descriptor(id: &str) -> PackageDescriptor {
        PackageDescriptor {
            id: id.to_string(),
            name: "Chess".to_string(),
            author: "dev".to_string(),
            short_description: "Play chess".to_string(),
            description: "A chess game".to_string(),
            category: "play".to_string(),
            compatible_with: 1.0,
            assets: PackageAssets {
                path: "app.js".to_string(),
                icon: "icon.png".to_string(),
                banner: None,
            },
            versions: vec![VersionEntry {
                version: "1.0.0".to_string(),
                date: "2024-01-01T00:00:00Z".to_string(),
            }],
            latest_version_info: String::new(),
        }
    }

    fn record(id: &str) -> InstalledRecord {
        InstalledRecord {
            safe_key: safe_key(id),
            descriptor: descriptor(id),
            icon: inline_icon("icon.png", b"png-bytes"),
        }
    }

    fn index_store() -> (TempDir, IndexStore) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::new(dir.path()));
        (dir, IndexStore::new(store))
    }

    #[test]
    fn test_safe_key_replaces_separators() {
        assert_eq!(safe_key("games/chess"), "games--chess");
        assert_eq!(safe_key("plain"), "plain");
        assert_eq!(safe_key("a/b/c"), "a--b--c");
        assert!(!safe_key("games/chess").contains('/'));
    }

    #[test]
    fn test_safe_key_distinct_for_catalog_ids() {
        let ids = ["games/chess", "games/checkers", "work/chess", "chess"];
        let keys: std::collections::HashSet<_> = ids.iter().map(|id| safe_key(id)).collect();
        assert_eq!(keys.len(), ids.len());
    }

    #[test]
    fn test_payload_path() {
        assert_eq!(
            payload_path("games--chess"),
            "Registry/AppStore/games--chess.app"
        );
    }

    #[test]
    fn test_inline_icon_media_types() {
        assert!(inline_icon("icon.png", b"x").starts_with("data:image/png;base64,"));
        assert!(inline_icon("icon.jpeg", b"x").starts_with("data:image/jpeg;base64,"));
        assert!(inline_icon("icon.svg", b"x").starts_with("data:image/svg+xml;base64,"));
        assert!(inline_icon("icon", b"x").starts_with("data:application/octet-stream;base64,"));
    }

    #[test]
    fn test_load_absent_manifest_is_empty() {
        let (_dir, store) = index_store();
        let index = store.load().unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (_dir, store) = index_store();

        let mut index = LocalIndex::new();
        index.insert("games--chess".to_string(), record("games/chess"));
        store.save(&index).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        let entry = &loaded["games--chess"];
        assert_eq!(entry.descriptor.id, "games/chess");
        assert_eq!(entry.descriptor.versions[0].version, "1.0.0");
        assert!(entry.icon.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_save_is_full_rewrite() {
        let (_dir, store) = index_store();

        let mut index = LocalIndex::new();
        index.insert("games--chess".to_string(), record("games/chess"));
        index.insert("work--notes".to_string(), record("work/notes"));
        store.save(&index).unwrap();

        index.remove("games--chess");
        store.save(&index).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.contains_key("games--chess"));
    }

    #[test]
    fn test_ensure_container_is_idempotent() {
        let (_dir, store) = index_store();
        store.ensure_container().unwrap();
        store.ensure_container().unwrap();
        assert!(store.store.what_is(REGISTRY_DIR).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_manifest_is_a_store_error() {
        let (_dir, store) = index_store();
        store.ensure_container().unwrap();
        store.store.write_file(INDEX_PATH, "not json").unwrap();

        assert!(matches!(store.load(), Err(Error::Store(_))));
    }
}
