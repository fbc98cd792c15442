// crates/query-relay-core/src/hashing.rs
// ============================================================================
// Module: Query Relay Canonical Hashing
// Description: RFC 8785 JSON canonicalization and SHA-256 digests.
// Purpose: Fingerprint statements and payloads for audit without logging them.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Audit events never carry literal parameter values or raw payloads. They
//! carry SHA-256 digests instead: statement text is hashed as raw UTF-8 bytes
//! and JSON payloads are hashed over their RFC 8785 canonical form so that
//! key order never changes a digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// SHA-256 digest rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashDigest(String);

impl HashDigest {
    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    HashDigest(hex_encode(&hasher.finalize()))
}

/// Hashes the canonical JSON form of a serializable value.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<HashDigest, HashError> {
    let bytes =
        serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))?;
    Ok(hash_bytes(&bytes))
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic_in_result_fn,
        reason = "Test assertions run inside Result-returning tests."
    )]

    use super::hash_bytes;
    use super::hash_canonical_json;

    #[test]
    fn sha256_of_empty_input_matches_known_vector() {
        assert_eq!(
            hash_bytes(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn canonical_hash_ignores_key_order() -> Result<(), Box<dyn std::error::Error>> {
        let left: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#)?;
        let right: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#)?;
        assert_eq!(hash_canonical_json(&left)?, hash_canonical_json(&right)?);
        Ok(())
    }
}
