//! Canonical-JSON hashing used for engine pool fingerprints and result
//! cache keys. Both need the same property: two semantically identical
//! configs, with their keys in a different order, must hash identically.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Keys stripped before fingerprinting a connector config or hashing a
/// cache key, because they vary per-call without changing what the
/// underlying connection/query actually is.
pub const EPHEMERAL_KEYS: &[&str] = &["execution_context", "ui", "connection_id"];

/// Recursively sorts object keys so that two structurally-equal JSON values
/// serialize identically regardless of the order their keys were inserted
/// in. Arrays are left in place: element order is semantically meaningful
/// (e.g. SQL parameter lists), unlike object key order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Removes the well-known ephemeral keys from a top-level JSON object
/// before fingerprinting. No-op on non-object values.
pub fn strip_ephemeral_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut cleaned = map.clone();
            for key in EPHEMERAL_KEYS {
                cleaned.remove(*key);
            }
            Value::Object(cleaned)
        }
        other => other.clone(),
    }
}

/// SHA-256 of the canonical-JSON serialization of `value`, as lowercase hex.
pub fn hash_canonical(value: &Value) -> String {
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical).expect("serde_json::Value always serializes");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

/// A connector-pool fingerprint: `sha256(kind, config-without-ephemeral-keys, options)`.
/// Two configs that only differ by an ephemeral key collapse to the same
/// fingerprint, so `EnginePool` can safely share the underlying connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PoolFingerprint(String);

impl PoolFingerprint {
    pub fn compute(kind: &str, config: &Value, options: &Value) -> Self {
        let stripped_config = strip_ephemeral_keys(config);
        let combined = serde_json::json!({
            "kind": kind,
            "config": stripped_config,
            "options": options,
        });
        Self(hash_canonical(&combined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PoolFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A result-cache key: `sha256(canonical_json(request))`, independent of
/// key insertion order in the request payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(request: &Value) -> Self {
        Self(hash_canonical(request))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
