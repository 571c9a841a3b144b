//! Content hashing — deterministic identification of inputs and formulas.
//!
//! - `content_hash()`: BLAKE3 over the canonical JSON of any serializable value.
//! - `ContentHash`: hex digest newtype used as audit keys (input hash, formula
//!   hash, hypothesis content hash).
//!
//! Canonical JSON relies on struct field order and `BTreeMap` key order, so the
//! same value always hashes to the same digest across runs and platforms.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded BLAKE3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash the canonical JSON encoding of `value`.
///
/// Values that fail to serialize (maps with non-string keys, for instance)
/// fall back to hashing their `Debug` rendering, which is still deterministic
/// for a given build.
pub fn content_hash<T: Serialize + fmt::Debug>(value: &T) -> ContentHash {
    match serde_json::to_vec(value) {
        Ok(json) => ContentHash::from_bytes(&json),
        Err(_) => ContentHash::from_bytes(format!("{value:?}").as_bytes()),
    }
}
