//! TTL-bounded cache for ephemeral query results, keyed the same way
//! `synqx_connectors::pool::PoolFingerprint` keys connector handles: a
//! SHA-256 over canonicalized JSON, so key order never affects the hash.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use synqx_ids::ConnectionId;
use synqx_protocol::defaults::RESULT_CACHE_TTL;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultCacheKey(String);

impl ResultCacheKey {
    pub fn compute(connection_id: &ConnectionId, query: &str, limit: Option<u64>, offset: Option<u64>, params: &Value) -> Self {
        let canonical = serde_json::json!({
            "connection_id": connection_id.as_str(),
            "query": query,
            "limit": limit,
            "offset": offset,
            "params": canonicalize(params),
        });
        let bytes = serde_json::to_vec(&canonical).expect("cache key payload is always serializable");
        Self(hex::encode(Sha256::digest(&bytes)))
    }
}

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

struct Entry {
    value: Value,
    inserted_at: Instant,
}

/// A plain in-process TTL map. A later pass can back this with a real KV
/// store if results need to survive a control-plane restart; nothing here
/// currently requires that.
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<ResultCacheKey, Entry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &ResultCacheKey) -> Option<Value> {
        let mut entries = self.entries.lock().expect("result cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: ResultCacheKey, value: Value) {
        let mut entries = self.entries.lock().expect("result cache lock poisoned");
        entries.insert(key, Entry { value, inserted_at: Instant::now() });
    }

    /// Drops every entry whose TTL has elapsed. Intended to be called off
    /// the same tick as the SLA sweep, not on every lookup.
    pub fn sweep_expired(&self) {
        let mut entries = self.entries.lock().expect("result cache lock poisoned");
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(RESULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_affect_the_hash() {
        let conn = ConnectionId::new();
        let a = ResultCacheKey::compute(&conn, "select 1", None, None, &serde_json::json!({"a": 1, "b": 2}));
        let b = ResultCacheKey::compute(&conn, "select 1", None, None, &serde_json::json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn put_then_get_round_trips_before_ttl_elapses() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let key = ResultCacheKey::compute(&ConnectionId::new(), "select 1", Some(100), None, &Value::Null);
        cache.put(key.clone(), serde_json::json!({"rows": []}));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn expired_entries_are_evicted_on_lookup() {
        let cache = ResultCache::new(Duration::from_millis(1));
        let key = ResultCacheKey::compute(&ConnectionId::new(), "select 1", None, None, &Value::Null);
        cache.put(key.clone(), serde_json::json!({"rows": []}));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }
}
