// src/vfs/mod.rs

//! Persistent key-path store
//!
//! Payloads and the install manifest are persisted through this interface.
//! Keys are forward-slash separated paths ("Registry/AppStore/...") that are
//! independent of the host filesystem layout. The engine treats the store as
//! an external collaborator; [`DiskStore`] is the concrete implementation
//! used by the CLI and the test suite.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// What a key-path points at inside the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Folder,
}

/// Key-path byte store the engine persists into
pub trait PersistentStore: Send + Sync {
    /// Classify a key-path, or `None` if nothing exists there
    fn what_is(&self, path: &str) -> Result<Option<PathKind>>;

    /// List the entry names directly under a folder
    fn list(&self, path: &str) -> Result<Vec<String>>;

    /// Create a folder and any missing parents; idempotent
    fn create_folder(&self, path: &str) -> Result<()>;

    /// Read a file as text
    fn read_file(&self, path: &str) -> Result<String>;

    /// Write a file, replacing any previous content
    fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Delete a file or folder
    fn delete(&self, path: &str) -> Result<()>;
}

/// Disk-backed store rooted at a directory
///
/// Key-paths map directly onto paths under the root. Only plain path
/// components are accepted, so a key can never escape the root.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        for component in rel.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(Error::Store(format!("invalid store path: {}", path))),
            }
        }
        Ok(self.root.join(rel))
    }
}

impl PersistentStore for DiskStore {
    fn what_is(&self, path: &str) -> Result<Option<PathKind>> {
        let full = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(meta) if meta.is_dir() => Ok(Some(PathKind::Folder)),
            Ok(_) => Ok(Some(PathKind::File)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Store(format!("failed to stat {}: {}", path, e))),
        }
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path)?;
        let entries = fs::read_dir(&full)
            .map_err(|e| Error::Store(format!("failed to list {}: {}", path, e)))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::Store(format!("failed to list {}: {}", path, e)))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn create_folder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full)
            .map_err(|e| Error::Store(format!("failed to create folder {}: {}", path, e)))?;
        debug!("Created store folder {}", path);
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        fs::read_to_string(&full)
            .map_err(|e| Error::Store(format!("failed to read {}: {}", path, e)))
    }

    fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::write(&full, content)
            .map_err(|e| Error::Store(format!("failed to write {}: {}", path, e)))?;
        debug!("Wrote {} ({} bytes)", path, content.len());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        let result = match self.what_is(path)? {
            Some(PathKind::Folder) => fs::remove_dir_all(&full),
            Some(PathKind::File) => fs::remove_file(&full),
            None => return Err(Error::Store(format!("nothing to delete at {}", path))),
        };
        result.map_err(|e| Error::Store(format!("failed to delete {}: {}", path, e)))?;
        debug!("Deleted {}", path);
        Ok(())
    }
}
