//! `memory`: an in-process connector with no backing store beyond a
//! `Mutex<HashMap>` of named tables. Used by tests and by example pipelines
//! that need a connector without standing up a real database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::Digest;

use synqx_protocol::types::{Asset, AssetType, ColumnDataType, SchemaColumnSpec, SchemaSnapshot, WriteMode};

use crate::capability::{BatchReader, BatchWriter, Connectable, Discoverer, RowBatch, SchemaInferrer};
use crate::error::{ConnectorError, ConnectorResult};
use crate::registry::{ConnectorHandle, ConnectorHandleBuilder};

#[derive(Default)]
struct Store {
    tables: HashMap<String, RowBatch>,
}

/// Shared in-memory table store. `Arc`-wrapped so the same instance can be
/// seeded by a test before being installed into a [`crate::registry::ConnectorRegistry`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: Arc<Mutex<Store>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, table: &str, rows: RowBatch) {
        self.store.lock().expect("memory connector lock poisoned").tables.insert(table.to_string(), rows);
    }

    pub fn table(&self, table: &str) -> RowBatch {
        self.store.lock().expect("memory connector lock poisoned").tables.get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Connectable for MemoryConnector {
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
impl Discoverer for MemoryConnector {
    async fn discover_assets(&self, _config: &Value) -> ConnectorResult<Vec<Asset>> {
        let store = self.store.lock().expect("memory connector lock poisoned");
        Ok(store
            .tables
            .keys()
            .map(|name| Asset {
                id: synqx_ids::AssetId::new(),
                connection_id: synqx_ids::ConnectionId::new(),
                name: name.clone(),
                fqn: name.clone(),
                asset_type: AssetType::Table,
                is_source: true,
                is_destination: true,
                is_incremental: false,
                schema: None,
            })
            .collect())
    }
}

#[async_trait]
impl SchemaInferrer for MemoryConnector {
    async fn infer_schema(&self, _config: &Value, asset: &str) -> ConnectorResult<SchemaSnapshot> {
        let rows = self.table(asset);
        let first = rows.first().ok_or_else(|| {
            ConnectorError::InvalidConfig { kind: "memory".to_string(), reason: format!("asset '{asset}' has no rows to infer a schema from") }
        })?;
        let columns: Vec<SchemaColumnSpec> = first
            .keys()
            .map(|name| SchemaColumnSpec { name: name.clone(), data_type: ColumnDataType::String, nullable: true })
            .collect();
        let hash = hex::encode(sha2::Sha256::digest(
            serde_json::to_vec(&columns).expect("schema columns are always serializable"),
        ));
        Ok(SchemaSnapshot { version: 1, hash, columns })
    }
}

#[async_trait]
impl BatchReader for MemoryConnector {
    async fn read_batch(
        &self,
        _config: &Value,
        asset: &str,
        batch_size: usize,
        _incremental_filter: Option<&Value>,
    ) -> ConnectorResult<RowBatch> {
        let rows = self.table(asset);
        Ok(rows.into_iter().take(batch_size).collect())
    }
}

#[async_trait]
impl BatchWriter for MemoryConnector {
    async fn write_batch(
        &self,
        _config: &Value,
        target_table: &str,
        write_mode: WriteMode,
        rows: RowBatch,
    ) -> ConnectorResult<u64> {
        let mut store = self.store.lock().expect("memory connector lock poisoned");
        let written = rows.len() as u64;
        match write_mode {
            WriteMode::Append | WriteMode::Upsert => {
                store.tables.entry(target_table.to_string()).or_default().extend(rows);
            }
            WriteMode::Replace | WriteMode::Overwrite => {
                store.tables.insert(target_table.to_string(), rows);
            }
        }
        Ok(written)
    }
}

pub fn handle_for(connector: MemoryConnector) -> ConnectorHandle {
    let connectable: Arc<MemoryConnector> = Arc::new(connector);
    ConnectorHandleBuilder::new("memory", connectable.clone())
        .discoverer(connectable.clone())
        .schema_inferrer(connectable.clone())
        .batch_reader(connectable.clone())
        .batch_writer(connectable)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("id".to_string(), Value::from(id));
        m
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_the_same_table() {
        let connector = MemoryConnector::new();
        let handle = handle_for(connector);
        let writer = handle.as_batch_writer().unwrap();
        writer.write_batch(&Value::Null, "orders", WriteMode::Append, vec![row(1), row(2)]).await.unwrap();
        let reader = handle.as_batch_reader().unwrap();
        let rows = reader.read_batch(&Value::Null, "orders", 10, None).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn overwrite_replaces_rather_than_appends() {
        let connector = MemoryConnector::new();
        let handle = handle_for(connector);
        let writer = handle.as_batch_writer().unwrap();
        writer.write_batch(&Value::Null, "orders", WriteMode::Append, vec![row(1)]).await.unwrap();
        writer.write_batch(&Value::Null, "orders", WriteMode::Overwrite, vec![row(2), row(3)]).await.unwrap();
        let reader = handle.as_batch_reader().unwrap();
        let rows = reader.read_batch(&Value::Null, "orders", 10, None).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
