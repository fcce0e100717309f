//! `object_store`: a staging-capable file connector over an in-memory
//! directory tree, standing in for a real S3/GCS/Azure Blob backend. Used
//! for staged writes (write-to-files-then-COPY) and general file ops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use synqx_protocol::types::WriteMode;

use crate::capability::{Connectable, FileOps, RowBatch, StagedWriter};
use crate::error::{ConnectorError, ConnectorResult};
use crate::registry::{ConnectorHandle, ConnectorHandleBuilder};

#[derive(Default)]
struct Store {
    files: HashMap<String, Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct ObjectStoreConnector {
    store: Arc<Mutex<Store>>,
}

impl ObjectStoreConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connectable for ObjectStoreConnector {
    async fn connect(&self, _config: &Value) -> ConnectorResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn test_connection(&self, _config: &Value) -> ConnectorResult<()> {
        Ok(())
    }
}

#[async_trait]
impl FileOps for ObjectStoreConnector {
    async fn list_files(&self, _config: &Value, path: &str) -> ConnectorResult<Vec<String>> {
        let store = self.store.lock().expect("object store lock poisoned");
        Ok(store.files.keys().filter(|k| k.starts_with(path)).cloned().collect())
    }

    async fn download_file(&self, _config: &Value, path: &str) -> ConnectorResult<Vec<u8>> {
        let store = self.store.lock().expect("object store lock poisoned");
        store.files.get(path).cloned().ok_or_else(|| ConnectorError::Other(format!("no such object: {path}")))
    }

    async fn upload_file(&self, _config: &Value, path: &str, data: &[u8]) -> ConnectorResult<()> {
        let mut store = self.store.lock().expect("object store lock poisoned");
        store.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete_file(&self, _config: &Value, path: &str) -> ConnectorResult<()> {
        let mut store = self.store.lock().expect("object store lock poisoned");
        store.files.remove(path);
        Ok(())
    }

    async fn create_directory(&self, _config: &Value, _path: &str) -> ConnectorResult<()> {
        // Flat key space; directories have no independent existence to create.
        Ok(())
    }

    async fn zip_directory(&self, _config: &Value, path: &str) -> ConnectorResult<Vec<u8>> {
        let store = self.store.lock().expect("object store lock poisoned");
        let mut archive = Vec::new();
        for (name, bytes) in store.files.iter().filter(|(k, _)| k.starts_with(path)) {
            archive.extend_from_slice(name.as_bytes());
            archive.push(0);
            archive.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            archive.extend_from_slice(bytes);
        }
        Ok(archive)
    }
}

#[async_trait]
impl StagedWriter for ObjectStoreConnector {
    async fn write_staged(
        &self,
        _config: &Value,
        target_table: &str,
        write_mode: WriteMode,
        rows: RowBatch,
    ) -> ConnectorResult<u64> {
        let path = format!("staging/{target_table}/{}.jsonl", uuid_like_suffix(&rows));
        let mut buf = Vec::new();
        for row in &rows {
            serde_json::to_writer(&mut buf, row).map_err(|e| ConnectorError::Other(e.to_string()))?;
            buf.push(b'\n');
        }
        let count = rows.len() as u64;
        let mut store = self.store.lock().expect("object store lock poisoned");
        match write_mode {
            WriteMode::Replace | WriteMode::Overwrite => {
                let prefix = format!("staging/{target_table}/");
                store.files.retain(|k, _| !k.starts_with(&prefix));
            }
            WriteMode::Append | WriteMode::Upsert => {}
        }
        store.files.insert(path, buf);
        Ok(count)
    }
}

/// Deterministic, dependency-free stand-in for a UUID: a staging connector
/// shouldn't collide on concurrent writes to the same table within one
/// process, so this hashes the batch's content rather than pulling in a
/// random source.
fn uuid_like_suffix(rows: &RowBatch) -> String {
    use sha2::{Digest, Sha256};
    let bytes = serde_json::to_vec(rows).unwrap_or_default();
    hex::encode(&Sha256::digest(&bytes)[..8])
}

pub fn handle_for(connector: ObjectStoreConnector) -> ConnectorHandle {
    let connectable: Arc<ObjectStoreConnector> = Arc::new(connector);
    ConnectorHandleBuilder::new("object_store", connectable.clone())
        .staged_writer(connectable.clone())
        .file_ops(connectable)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn row(id: i64) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("id".to_string(), Value::from(id));
        m
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_bytes() {
        let connector = ObjectStoreConnector::new();
        let handle = handle_for(connector);
        let ops = handle.as_file_ops().unwrap();
        ops.upload_file(&Value::Null, "a/b.txt", b"hello").await.unwrap();
        let data = ops.download_file(&Value::Null, "a/b.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn staged_write_lands_a_jsonl_object_under_the_table_prefix() {
        let connector = ObjectStoreConnector::new();
        let handle = handle_for(connector.clone());
        let writer = handle.as_staged_writer().unwrap();
        let written = writer.write_staged(&Value::Null, "orders", WriteMode::Append, vec![row(1), row(2)]).await.unwrap();
        assert_eq!(written, 2);
        let ops = handle.as_file_ops().unwrap();
        let files = ops.list_files(&Value::Null, "staging/orders/").await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn overwrite_staged_write_clears_prior_objects_for_the_table() {
        let connector = ObjectStoreConnector::new();
        let handle = handle_for(connector.clone());
        let writer = handle.as_staged_writer().unwrap();
        writer.write_staged(&Value::Null, "orders", WriteMode::Append, vec![row(1)]).await.unwrap();
        writer.write_staged(&Value::Null, "orders", WriteMode::Overwrite, vec![row(2)]).await.unwrap();
        let ops = handle.as_file_ops().unwrap();
        let files = ops.list_files(&Value::Null, "staging/orders/").await.unwrap();
        assert_eq!(files.len(), 1);
    }
}
