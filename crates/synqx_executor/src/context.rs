//! Everything one `Executor::run` call needs that isn't carried by the
//! `PipelinePlan` itself: the shared registries/pool (wired once at
//! `synqx-agent` startup as explicit services rather than globals), the
//! resolved connections/assets for this run, and the cooperative
//! cancellation flag.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use synqx_connectors::{ConnectorRegistry, EnginePool};
use synqx_ids::{AssetId, ConnectionId, PipelineRunId, PipelineVersionId};
use synqx_protocol::types::{Asset, Connection};
use synqx_runtime::{OnChunk, OperatorRegistry};

#[derive(Clone)]
pub struct RunContext {
    pub pipeline_run_id: PipelineRunId,
    pub pipeline_version_id: PipelineVersionId,
    pub operator_registry: Arc<OperatorRegistry>,
    pub connector_registry: Arc<ConnectorRegistry>,
    pub engine_pool: Arc<EnginePool>,
    pub connections: Arc<HashMap<ConnectionId, Connection>>,
    pub assets: Arc<HashMap<AssetId, Asset>>,
    pub cancellation: CancellationToken,
    /// Bounds concurrent in-flight nodes within one layer. `0` means
    /// `num_cpus * 2`.
    pub max_workers: usize,
    pub on_chunk: OnChunk,
    /// Row batch size an EXTRACT node requests per `read_batch` page.
    pub default_batch_size: usize,
    /// Byte cap for a node's in-process quarantine ring buffer when it has
    /// no `quarantine_asset_ref` configured.
    pub forensic_buffer_bytes: usize,
}

impl RunContext {
    pub fn resolved_worker_count(&self) -> usize {
        if self.max_workers == 0 {
            std::thread::available_parallelism().map(|n| n.get() * 2).unwrap_or(4)
        } else {
            self.max_workers
        }
    }
}
