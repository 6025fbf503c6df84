// src/lib.rs

//! Charon App Store Engine
//!
//! Installation engine for a desktop-environment app store. Resolves a
//! remote package catalog against the running platform version, decides
//! install/update/uninstall actions, verifies package identity by content
//! digest, and maintains a durable manifest of installed packages inside
//! a key-path store.
//!
//! # Architecture
//!
//! - Catalog-first: remote entries are validated at ingestion, never
//!   patched up deeper in the install flow
//! - Change detection by fast non-cryptographic digest; tamper resistance
//!   is out of the threat model
//! - The manifest is a single JSON document, always rewritten whole
//! - Mutating flows are serialized per package key

pub mod compat;
mod error;
pub mod index;
pub mod manager;
pub mod registry;
pub mod verify;
pub mod vfs;

pub use error::{Error, Result};
