// src/manager/mod.rs

//! Install manager: orchestrates catalog, verifier, and persistent store
//!
//! Each mutating flow runs start to finish under a per-key lock, and the
//! manifest's load-merge-save cycle runs under an additional whole-index
//! lock so concurrent installs of different packages cannot lose each
//! other's entries. The ordering invariant throughout: the payload is made
//! durable first, the manifest second, so the manifest never references a
//! payload that was not written.

use crate::compat::{self, CompatibilityVerdict};
use crate::error::{Error, Result};
use crate::index::{self, IndexStore, InstalledRecord, LocalIndex};
use crate::registry::{CatalogHandle, PackageDescriptor};
use crate::verify;
use crate::vfs::{PathKind, PersistentStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Install state of a catalog entry relative to the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    UpToDate,
    UpdateAvailable,
}

/// What an install call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Payload written and manifest updated
    Installed,
    /// Already present and not forced; the stored payload went to the launcher
    Opened,
}

/// External collaborator that runs an installed package's source
///
/// Execution is out of scope for the engine; this is the single handoff
/// contract.
pub trait Launcher: Send + Sync {
    /// Hand off raw package source; `sandboxed` selects the trust mode
    fn launch(&self, source: &str, sandboxed: bool) -> Result<()>;
}

/// Orchestrates install, update, and uninstall against one catalog
///
/// Holds every collaborator explicitly: store handle, index store, catalog
/// handle, launcher, platform version. No ambient globals.
pub struct InstallManager {
    store: Arc<dyn PersistentStore>,
    index: IndexStore,
    catalog: CatalogHandle,
    launcher: Arc<dyn Launcher>,
    platform_version: f64,
    /// One lock per storage key; serializes mutating flows for that key
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Guards the manifest's load-merge-save cycle across keys
    index_lock: Mutex<()>,
}

impl InstallManager {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        catalog: CatalogHandle,
        launcher: Arc<dyn Launcher>,
        platform_version: f64,
    ) -> Self {
        let index = IndexStore::new(store.clone());
        Self {
            store,
            index,
            catalog,
            launcher,
            platform_version,
            key_locks: Mutex::new(HashMap::new()),
            index_lock: Mutex::new(()),
        }
    }

    /// Compatibility verdict for a catalog entry against the running platform
    ///
    /// The manager never prompts; a caller gating a fresh install of a
    /// non-compatible package must obtain confirmation itself before
    /// forcing the install.
    pub fn compatibility(&self, descriptor: &PackageDescriptor) -> CompatibilityVerdict {
        compat::resolve(descriptor.compatible_with, self.platform_version)
    }

    /// Snapshot of the manifest
    pub fn installed(&self) -> Result<LocalIndex> {
        self.index.load()
    }

    /// Install a package, or open it when already present and not forced
    ///
    /// When no payload exists for the derived key, or `force` is true, the
    /// payload is fetched and written, the icon is fetched and inlined, and
    /// the manifest gains (or replaces) the record. When a payload already
    /// exists and `force` is false, nothing is fetched or written: the
    /// stored payload is read back and handed to the launcher.
    pub fn install(&self, descriptor: &PackageDescriptor, force: bool) -> Result<InstallOutcome> {
        let key = descriptor.safe_key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        self.index.ensure_container()?;

        let path = index::payload_path(&key);
        if self.store.what_is(&path)?.is_some() && !force {
            debug!("{} already installed, handing off to launcher", descriptor.id);
            let source = self.store.read_file(&path)?;
            self.launcher.launch(&source, true)?;
            return Ok(InstallOutcome::Opened);
        }

        info!("Installing {} as {}", descriptor.id, key);

        let payload = self.catalog.fetch_payload(descriptor)?;
        let source = String::from_utf8(payload).map_err(|e| {
            Error::AssetFetch(format!(
                "payload for {} is not valid UTF-8: {}",
                descriptor.id, e
            ))
        })?;

        // Payload first. The manifest must never lead the payload.
        self.store.write_file(&path, &source)?;

        let icon_bytes = self.catalog.fetch_icon(descriptor)?;
        let icon = index::inline_icon(&descriptor.assets.icon, &icon_bytes);

        let record = InstalledRecord {
            safe_key: key.clone(),
            descriptor: descriptor.clone(),
            icon,
        };

        {
            let _index_guard = self.index_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut idx = self.index.load()?;
            idx.insert(key, record);
            self.index.save(&idx)?;
        }

        info!("Installed {}", descriptor.id);
        Ok(InstallOutcome::Installed)
    }

    /// Classify a catalog entry against the local store without mutating state
    pub fn check_update(&self, descriptor: &PackageDescriptor) -> Result<InstallState> {
        let key = descriptor.safe_key();
        let path = index::payload_path(&key);

        let idx = self.index.load()?;
        if !idx.contains_key(&key) || self.store.what_is(&path)? != Some(PathKind::File) {
            return Ok(InstallState::NotInstalled);
        }

        let local = verify::identity_hash(self.store.read_file(&path)?.as_bytes());
        let remote = verify::identity_hash(&self.catalog.fetch_payload(descriptor)?);

        if verify::needs_update(&local, &remote) {
            Ok(InstallState::UpdateAvailable)
        } else {
            Ok(InstallState::UpToDate)
        }
    }

    /// Remove an installed package's payload and its manifest entry
    ///
    /// The manifest entry is pruned along with the payload so a removed
    /// package can never be misreported as installed.
    pub fn uninstall(&self, key: &str) -> Result<()> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let path = index::payload_path(key);
        match self.store.what_is(&path)? {
            Some(PathKind::File) => self.store.delete(&path)?,
            _ => return Err(Error::NotInstalled(key.to_string())),
        }

        {
            let _index_guard = self.index_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut idx = self.index.load()?;
            if idx.remove(key).is_some() {
                self.index.save(&idx)?;
            }
        }

        info!("Uninstalled {}", key);
        Ok(())
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{self, MemoryTransport, RegistryConfig};
    use crate::vfs::DiskStore;
    use tempfile::TempDir;

    const HOST: &str = "https://store.test/";

    #[derive(Default)]
    struct RecordingLauncher {
        launches: Mutex<Vec<(String, bool)>>,
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, source: &str, sandboxed: bool) -> Result<()> {
            self.launches
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((source.to_string(), sandboxed));
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        transport: Arc<MemoryTransport>,
        launcher: Arc<RecordingLauncher>,
        manager: InstallManager,
    }

    fn fixture(platform_version: f64) -> Fixture {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert(
            "https://store.test/store.json",
            br#"{"api":["init","list"]}"#.to_vec(),
        );
        transport.insert(
            "https://store.test/pkgs/index.json",
            br#"[{"id":"games/chess","name":"Chess","author":"dev",
                  "shortDescription":"Play chess","description":"A chess game",
                  "category":"play","compatibleWith":1.0,
                  "assets":{"path":"app.js","icon":"icon.png"},
                  "versions":[{"ver":"1.0.0","date":"2024-01-01"}],
                  "latestVersionInfo":""}]"#
                .to_vec(),
        );
        transport.insert(
            "https://store.test/pkgs/games/chess/app.js",
            b"chess source v1".to_vec(),
        );
        transport.insert(
            "https://store.test/pkgs/games/chess/icon.png",
            b"icon bytes".to_vec(),
        );

        let transport_dyn: Arc<dyn crate::registry::Transport> = transport.clone();
        let catalog =
            registry::connect(transport_dyn, RegistryConfig::custom(HOST)).unwrap();

        let dir = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::new(dir.path()));
        let launcher = Arc::new(RecordingLauncher::default());
        let launcher_dyn: Arc<dyn Launcher> = launcher.clone();
        let manager = InstallManager::new(store, catalog, launcher_dyn, platform_version);

        Fixture {
            _dir: dir,
            transport,
            launcher,
            manager,
        }
    }

    fn chess(f: &Fixture) -> PackageDescriptor {
        let transport: Arc<dyn crate::registry::Transport> = f.transport.clone();
        let catalog = registry::connect(transport, RegistryConfig::custom(HOST)).unwrap();
        catalog.list().unwrap().remove(0)
    }

    #[test]
    fn test_install_then_up_to_date() {
        let f = fixture(1.0);
        let descriptor = chess(&f);

        let outcome = f.manager.install(&descriptor, true).unwrap();
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(
            f.manager.check_update(&descriptor).unwrap(),
            InstallState::UpToDate
        );
    }

    #[test]
    fn test_check_update_before_install() {
        let f = fixture(1.0);
        let descriptor = chess(&f);
        assert_eq!(
            f.manager.check_update(&descriptor).unwrap(),
            InstallState::NotInstalled
        );
    }

    #[test]
    fn test_second_install_opens_without_writing() {
        let f = fixture(1.0);
        let descriptor = chess(&f);

        f.manager.install(&descriptor, true).unwrap();

        // The remote payload changes, but a non-forced install must not
        // fetch or overwrite anything
        f.transport.insert(
            "https://store.test/pkgs/games/chess/app.js",
            b"chess source v2".to_vec(),
        );
        let before = f.transport.requests().len();

        let outcome = f.manager.install(&descriptor, false).unwrap();
        assert_eq!(outcome, InstallOutcome::Opened);
        assert_eq!(f.transport.requests().len(), before);

        let launches = f.launcher.launches.lock().unwrap();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].0, "chess source v1");
        assert!(launches[0].1, "handoff must request the sandboxed mode");
    }

    #[test]
    fn test_update_available_after_remote_change() {
        let f = fixture(1.0);
        let descriptor = chess(&f);

        f.manager.install(&descriptor, true).unwrap();
        f.transport.insert(
            "https://store.test/pkgs/games/chess/app.js",
            b"chess source v2".to_vec(),
        );

        assert_eq!(
            f.manager.check_update(&descriptor).unwrap(),
            InstallState::UpdateAvailable
        );

        // A forced install picks up the new payload
        f.manager.install(&descriptor, true).unwrap();
        assert_eq!(
            f.manager.check_update(&descriptor).unwrap(),
            InstallState::UpToDate
        );
    }

    #[test]
    fn test_uninstall_removes_payload_and_entry() {
        let f = fixture(1.0);
        let descriptor = chess(&f);
        let key = descriptor.safe_key();

        f.manager.install(&descriptor, true).unwrap();
        f.manager.uninstall(&key).unwrap();

        assert_eq!(
            f.manager.check_update(&descriptor).unwrap(),
            InstallState::NotInstalled
        );
        assert!(f.manager.installed().unwrap().is_empty());
    }

    #[test]
    fn test_uninstall_unknown_key_fails() {
        let f = fixture(1.0);
        assert!(matches!(
            f.manager.uninstall("never--installed"),
            Err(Error::NotInstalled(_))
        ));
    }

    #[test]
    fn test_failed_payload_fetch_leaves_no_state() {
        let f = fixture(1.0);
        let descriptor = chess(&f);
        f.transport.remove("https://store.test/pkgs/games/chess/app.js");

        assert!(f.manager.install(&descriptor, true).is_err());
        assert!(f.manager.installed().unwrap().is_empty());
        assert_eq!(
            f.manager.check_update(&descriptor).unwrap(),
            InstallState::NotInstalled
        );
    }

    #[test]
    fn test_failed_icon_fetch_leaves_payload_but_no_entry() {
        let f = fixture(1.0);
        let descriptor = chess(&f);
        f.transport.remove("https://store.test/pkgs/games/chess/icon.png");

        // Payload-written-but-unindexed is the one tolerated partial state
        assert!(f.manager.install(&descriptor, true).is_err());
        assert!(f.manager.installed().unwrap().is_empty());
    }

    #[test]
    fn test_compatibility_verdicts() {
        let f = fixture(1.0);
        let mut descriptor = chess(&f);

        assert!(f.manager.compatibility(&descriptor).is_compatible());

        descriptor.compatible_with = 2.0;
        let verdict = f.manager.compatibility(&descriptor);
        assert_eq!(
            verdict.compatibility,
            crate::compat::Compatibility::Incompatible
        );

        descriptor.compatible_with = 0.5;
        let verdict = f.manager.compatibility(&descriptor);
        assert_eq!(
            verdict.compatibility,
            crate::compat::Compatibility::PossiblyIncompatible
        );
    }

    #[test]
    fn test_manifest_record_snapshot() {
        let f = fixture(1.0);
        let descriptor = chess(&f);
        f.manager.install(&descriptor, true).unwrap();

        let index = f.manager.installed().unwrap();
        let record = &index["games--chess"];
        assert_eq!(record.safe_key, "games--chess");
        assert_eq!(record.descriptor.id, "games/chess");
        assert!(record.icon.starts_with("data:image/png;base64,"));
    }
}
