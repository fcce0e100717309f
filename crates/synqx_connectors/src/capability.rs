//! Capability surface: rather than asking a
//! connector "what can you do" via reflection, each capability is its own
//! trait. A connector implements only the traits its backend actually
//! supports, and callers probe for a capability with `as_batch_reader()` and
//! friends on [`crate::registry::ConnectorHandle`] instead of matching on a
//! `connector_kind` string.

use async_trait::async_trait;
use serde_json::Value;

use synqx_protocol::types::{Asset, SchemaSnapshot, WriteMode};

use crate::error::ConnectorResult;

/// A single row batch in the row-major JSON shape the runtime's operators
/// already speak (see `synqx_runtime::operators::util`), kept here rather
/// than pulling in `arrow` so this crate stays decoupled from the dataflow
/// engine's in-memory representation.
pub type RowBatch = Vec<serde_json::Map<String, Value>>;

/// Validates connector-specific configuration before a connection is ever
/// attempted.
pub trait ConnectorConfig {
    fn validate(&self, config: &Value) -> ConnectorResult<()>;
}

/// Every connector implements this: open/close/probe a connection. Required
/// for a connector to be registered at all.
#[async_trait]
pub trait Connectable: Send + Sync {
    async fn connect(&self, config: &Value) -> ConnectorResult<()>;
    async fn disconnect(&self) -> ConnectorResult<()>;
    async fn test_connection(&self, config: &Value) -> ConnectorResult<()>;
}

#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover_assets(&self, config: &Value) -> ConnectorResult<Vec<Asset>>;
}

#[async_trait]
pub trait SchemaInferrer: Send + Sync {
    async fn infer_schema(&self, config: &Value, asset: &str) -> ConnectorResult<SchemaSnapshot>;
}

#[async_trait]
pub trait BatchReader: Send + Sync {
    async fn read_batch(
        &self,
        config: &Value,
        asset: &str,
        batch_size: usize,
        incremental_filter: Option<&Value>,
    ) -> ConnectorResult<RowBatch>;
}

#[async_trait]
pub trait CdcReader: Send + Sync {
    async fn read_cdc(&self, config: &Value, asset: &str, cdc_config: &Value) -> ConnectorResult<RowBatch>;
}

#[async_trait]
pub trait BatchWriter: Send + Sync {
    async fn write_batch(
        &self,
        config: &Value,
        target_table: &str,
        write_mode: WriteMode,
        rows: RowBatch,
    ) -> ConnectorResult<u64>;
}

#[async_trait]
pub trait StagedWriter: Send + Sync {
    fn supports_staging(&self) -> bool {
        true
    }

    async fn write_staged(
        &self,
        config: &Value,
        target_table: &str,
        write_mode: WriteMode,
        rows: RowBatch,
    ) -> ConnectorResult<u64>;
}

#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn execute_query(&self, config: &Value, query: &str) -> ConnectorResult<RowBatch>;
    async fn get_total_count(&self, config: &Value, asset: &str) -> ConnectorResult<u64>;
}

/// Row sampling for preview/profiling UIs. Any connector that can read
/// batches gets a default sampler for free via [`DelegatingSampler`].
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn fetch_sample(&self, config: &Value, asset: &str, limit: usize) -> ConnectorResult<RowBatch>;
}

/// Blanket default: a connector that only implements [`BatchReader`] still
/// gets sampling by capping `read_batch`'s `batch_size` at `limit`.
#[async_trait]
impl<T: BatchReader + ?Sized> Sampler for T {
    async fn fetch_sample(&self, config: &Value, asset: &str, limit: usize) -> ConnectorResult<RowBatch> {
        self.read_batch(config, asset, limit, None).await
    }
}

#[async_trait]
pub trait FileOps: Send + Sync {
    async fn list_files(&self, config: &Value, path: &str) -> ConnectorResult<Vec<String>>;
    async fn download_file(&self, config: &Value, path: &str) -> ConnectorResult<Vec<u8>>;
    async fn upload_file(&self, config: &Value, path: &str, data: &[u8]) -> ConnectorResult<()>;
    async fn delete_file(&self, config: &Value, path: &str) -> ConnectorResult<()>;
    async fn create_directory(&self, config: &Value, path: &str) -> ConnectorResult<()>;
    async fn zip_directory(&self, config: &Value, path: &str) -> ConnectorResult<Vec<u8>>;
}
