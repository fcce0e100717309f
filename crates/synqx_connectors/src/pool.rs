//! Engine pool: caches one live connection handle per distinct
//! `(kind, config, options)` fingerprint so that repeated reads/writes
//! against the same warehouse inside one pipeline run reuse a single
//! connection instead of reconnecting per node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::registry::ConnectorHandle;

/// Keys stripped from `config` before fingerprinting: they vary per call
/// site (UI session, connection row id, the execution context a node runs
/// under) without changing which physical engine should service the call.
const EPHEMERAL_KEYS: &[&str] = &["execution_context", "ui", "connection_id"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolFingerprint(String);

impl PoolFingerprint {
    pub fn compute(kind: &str, config: &Value, options: &Value) -> Self {
        let stripped = strip_ephemeral(config);
        let canonical = serde_json::json!({
            "kind": kind,
            "config": canonicalize(&stripped),
            "options": canonicalize(options),
        });
        let bytes = serde_json::to_vec(&canonical).expect("fingerprint payload is always serializable");
        let digest = Sha256::digest(&bytes);
        Self(hex::encode(digest))
    }
}

fn strip_ephemeral(config: &Value) -> Value {
    match config {
        Value::Object(map) => {
            let mut out = map.clone();
            for key in EPHEMERAL_KEYS {
                out.remove(*key);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Recursively sorts object keys so two semantically-identical configs with
/// differently-ordered keys hash identically.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Process-wide cache of live connector handles keyed by [`PoolFingerprint`].
/// A `ConnectorHandle` is cheap `Arc` data, not an open socket itself — the
/// connector implementation is responsible for any actual connection
/// pooling behind `Connectable::connect`; this pool's job is just to avoid
/// re-running `connect()` for an identical config within one process.
#[derive(Default)]
pub struct EnginePool {
    handles: Mutex<HashMap<PoolFingerprint, Arc<ConnectorHandle>>>,
}

impl EnginePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &self,
        kind: &str,
        config: &Value,
        options: &Value,
        build: impl FnOnce() -> Arc<ConnectorHandle>,
    ) -> Arc<ConnectorHandle> {
        let fingerprint = PoolFingerprint::compute(kind, config, options);
        let mut handles = self.handles.lock().expect("engine pool lock poisoned");
        handles.entry(fingerprint).or_insert_with(build).clone()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().expect("engine pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached handle. Connectors that hold real resources behind
    /// `Arc` release them once their last clone (here, and any in-flight
    /// node) is dropped.
    pub fn clear(&self) {
        self.handles.lock().expect("engine pool lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_keys_do_not_affect_the_fingerprint() {
        let a = serde_json::json!({"host": "db", "connection_id": 1, "ui": true});
        let b = serde_json::json!({"host": "db", "connection_id": 2, "ui": false});
        assert_eq!(
            PoolFingerprint::compute("postgres", &a, &Value::Null),
            PoolFingerprint::compute("postgres", &b, &Value::Null)
        );
    }

    #[test]
    fn key_order_does_not_affect_the_fingerprint() {
        let a = serde_json::json!({"host": "db", "port": 5432});
        let b = serde_json::json!({"port": 5432, "host": "db"});
        assert_eq!(
            PoolFingerprint::compute("postgres", &a, &Value::Null),
            PoolFingerprint::compute("postgres", &b, &Value::Null)
        );
    }

    #[test]
    fn different_kind_changes_the_fingerprint() {
        let cfg = serde_json::json!({"host": "db"});
        assert_ne!(
            PoolFingerprint::compute("postgres", &cfg, &Value::Null),
            PoolFingerprint::compute("mysql", &cfg, &Value::Null)
        );
    }

    #[test]
    fn pool_reuses_handle_for_the_same_fingerprint() {
        use crate::registry::ConnectorHandleBuilder;
        use async_trait::async_trait;
        use crate::error::ConnectorResult;
        use crate::capability::Connectable;

        struct Dummy;
        #[async_trait]
        impl Connectable for Dummy {
            async fn connect(&self, _c: &Value) -> ConnectorResult<()> {
                Ok(())
            }
            async fn disconnect(&self) -> ConnectorResult<()> {
                Ok(())
            }
            async fn test_connection(&self, _c: &Value) -> ConnectorResult<()> {
                Ok(())
            }
        }

        let pool = EnginePool::new();
        let cfg = serde_json::json!({"host": "db"});
        let build = || Arc::new(ConnectorHandleBuilder::new("dummy", Arc::new(Dummy)).build());
        let first = pool.get_or_insert_with("dummy", &cfg, &Value::Null, build);
        let second = pool.get_or_insert_with("dummy", &cfg, &Value::Null, build);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);
    }
}
