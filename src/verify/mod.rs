// src/verify/mod.rs

//! Content identity hashing for change detection
//!
//! Digests are xxh3-128: extremely fast and non-cryptographic. They exist to
//! answer one question: does the installed payload differ from the remote
//! one? Adversarial tampering is out of the threat model, so accidental
//! collision risk is acceptable.

use xxhash_rust::xxh3::xxh3_128;

/// Hex digest identifying a payload's content
pub fn identity_hash(data: &[u8]) -> String {
    format!("{:032x}", xxh3_128(data))
}

/// True when the installed digest no longer matches the remote digest
pub fn needs_update(local: &str, remote: &str) -> bool {
    local != remote
}
