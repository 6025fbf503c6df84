// src/error.rs

use thiserror::Error;

/// Core error types for Charon
#[derive(Error, Debug)]
pub enum Error {
    /// The catalog entry point could not be retrieved or is not a store module
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The catalog document is unreadable or its entries are unusable
    #[error("Malformed catalog: {0}")]
    CatalogFormat(String),

    /// A payload or icon fetch failed
    #[error("Asset fetch failed: {0}")]
    AssetFetch(String),

    /// Persistent store read/write/delete failure
    #[error("Store error: {0}")]
    Store(String),

    /// The requested package has no installed payload
    #[error("Package not installed: {0}")]
    NotInstalled(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using Charon's Error type
pub type Result<T> = std::result::Result<T, Error>;
