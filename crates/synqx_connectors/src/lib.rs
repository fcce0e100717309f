//! Capability-typed connector registry and engine pool.
//!
//! A connector is modeled as a set of small capability traits
//! ([`capability`]) rather than one god-trait, so a connector only
//! implements what its backend actually supports. [`registry`] holds the
//! process-wide map from `connector_kind` to a registered
//! [`registry::ConnectorHandle`]; [`pool`] caches one live handle per
//! distinct `(kind, config, options)` fingerprint so repeated access within
//! a pipeline run doesn't reconnect per node. [`hygiene`] strips
//! pipeline-internal keys before they reach a backend library call and
//! normalizes `schema.table` asset identifiers.

pub mod capability;
pub mod connectors;
pub mod error;
pub mod hygiene;
pub mod pool;
pub mod registry;

pub use capability::{
    BatchReader, BatchWriter, CdcReader, Connectable, ConnectorConfig, Discoverer, FileOps, QueryRunner, RowBatch,
    Sampler, SchemaInferrer, StagedWriter,
};
pub use error::{ConnectorError, ConnectorResult};
pub use pool::{EnginePool, PoolFingerprint};
pub use registry::{ConnectorFactory, ConnectorHandle, ConnectorHandleBuilder, ConnectorRegistry};
