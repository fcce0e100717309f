//! Process-wide connector registry. Connectors register themselves as `Arc<dyn Trait>`
//! behind an `RwLock`-guarded map keyed by lower-cased `connector_kind`, and
//! an unavailable backend (e.g. a driver that didn't link) just logs a
//! warning and declines to register rather than panicking the process.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::capability::{
    BatchReader, BatchWriter, CdcReader, Connectable, Discoverer, FileOps, QueryRunner, Sampler,
    SchemaInferrer, StagedWriter,
};
use crate::error::{ConnectorError, ConnectorResult};

/// A registered connector's capability set, each optional since a connector
/// only implements the traits its backend actually supports.
#[derive(Clone)]
pub struct ConnectorHandle {
    kind: String,
    connectable: Arc<dyn Connectable>,
    discoverer: Option<Arc<dyn Discoverer>>,
    schema_inferrer: Option<Arc<dyn SchemaInferrer>>,
    batch_reader: Option<Arc<dyn BatchReader>>,
    cdc_reader: Option<Arc<dyn CdcReader>>,
    batch_writer: Option<Arc<dyn BatchWriter>>,
    staged_writer: Option<Arc<dyn StagedWriter>>,
    query_runner: Option<Arc<dyn QueryRunner>>,
    sampler: Option<Arc<dyn Sampler>>,
    file_ops: Option<Arc<dyn FileOps>>,
}

impl ConnectorHandle {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn connectable(&self) -> &Arc<dyn Connectable> {
        &self.connectable
    }

    pub fn as_discoverer(&self) -> ConnectorResult<&Arc<dyn Discoverer>> {
        self.discoverer.as_ref().ok_or_else(|| self.unsupported("discover_assets"))
    }

    pub fn as_schema_inferrer(&self) -> ConnectorResult<&Arc<dyn SchemaInferrer>> {
        self.schema_inferrer.as_ref().ok_or_else(|| self.unsupported("infer_schema"))
    }

    pub fn as_batch_reader(&self) -> ConnectorResult<&Arc<dyn BatchReader>> {
        self.batch_reader.as_ref().ok_or_else(|| self.unsupported("read_batch"))
    }

    pub fn as_cdc_reader(&self) -> ConnectorResult<&Arc<dyn CdcReader>> {
        self.cdc_reader.as_ref().ok_or_else(|| self.unsupported("read_cdc"))
    }

    pub fn as_batch_writer(&self) -> ConnectorResult<&Arc<dyn BatchWriter>> {
        self.batch_writer.as_ref().ok_or_else(|| self.unsupported("write_batch"))
    }

    pub fn as_staged_writer(&self) -> ConnectorResult<&Arc<dyn StagedWriter>> {
        self.staged_writer.as_ref().ok_or_else(|| self.unsupported("write_staged"))
    }

    pub fn as_query_runner(&self) -> ConnectorResult<&Arc<dyn QueryRunner>> {
        self.query_runner.as_ref().ok_or_else(|| self.unsupported("execute_query"))
    }

    pub fn as_sampler(&self) -> ConnectorResult<&Arc<dyn Sampler>> {
        self.sampler.as_ref().ok_or_else(|| self.unsupported("fetch_sample"))
    }

    pub fn as_file_ops(&self) -> ConnectorResult<&Arc<dyn FileOps>> {
        self.file_ops.as_ref().ok_or_else(|| self.unsupported("file_ops"))
    }

    fn unsupported(&self, capability: &'static str) -> ConnectorError {
        ConnectorError::UnsupportedCapability { kind: self.kind.clone(), capability }
    }
}

/// Builder for a [`ConnectorHandle`], since most connectors only implement a
/// handful of the ten capability traits.
#[derive(Default)]
pub struct ConnectorHandleBuilder {
    kind: String,
    connectable: Option<Arc<dyn Connectable>>,
    discoverer: Option<Arc<dyn Discoverer>>,
    schema_inferrer: Option<Arc<dyn SchemaInferrer>>,
    batch_reader: Option<Arc<dyn BatchReader>>,
    cdc_reader: Option<Arc<dyn CdcReader>>,
    batch_writer: Option<Arc<dyn BatchWriter>>,
    staged_writer: Option<Arc<dyn StagedWriter>>,
    query_runner: Option<Arc<dyn QueryRunner>>,
    sampler: Option<Arc<dyn Sampler>>,
    file_ops: Option<Arc<dyn FileOps>>,
}

impl ConnectorHandleBuilder {
    pub fn new(kind: impl Into<String>, connectable: Arc<dyn Connectable>) -> Self {
        Self { kind: kind.into(), connectable: Some(connectable), ..Default::default() }
    }

    pub fn discoverer(mut self, v: Arc<dyn Discoverer>) -> Self {
        self.discoverer = Some(v);
        self
    }

    pub fn schema_inferrer(mut self, v: Arc<dyn SchemaInferrer>) -> Self {
        self.schema_inferrer = Some(v);
        self
    }

    pub fn batch_reader(mut self, v: Arc<dyn BatchReader>) -> Self {
        self.batch_reader = Some(v);
        self
    }

    pub fn cdc_reader(mut self, v: Arc<dyn CdcReader>) -> Self {
        self.cdc_reader = Some(v);
        self
    }

    pub fn batch_writer(mut self, v: Arc<dyn BatchWriter>) -> Self {
        self.batch_writer = Some(v);
        self
    }

    pub fn staged_writer(mut self, v: Arc<dyn StagedWriter>) -> Self {
        self.staged_writer = Some(v);
        self
    }

    pub fn query_runner(mut self, v: Arc<dyn QueryRunner>) -> Self {
        self.query_runner = Some(v);
        self
    }

    pub fn sampler(mut self, v: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(v);
        self
    }

    pub fn file_ops(mut self, v: Arc<dyn FileOps>) -> Self {
        self.file_ops = Some(v);
        self
    }

    pub fn build(self) -> ConnectorHandle {
        ConnectorHandle {
            kind: self.kind,
            connectable: self.connectable.expect("ConnectorHandleBuilder requires a Connectable"),
            discoverer: self.discoverer,
            schema_inferrer: self.schema_inferrer,
            batch_reader: self.batch_reader,
            cdc_reader: self.cdc_reader,
            batch_writer: self.batch_writer,
            staged_writer: self.staged_writer,
            query_runner: self.query_runner,
            sampler: self.sampler,
            file_ops: self.file_ops,
        }
    }
}

/// A zero-argument constructor a connector module registers under its kind
/// name. Returning `None` means the backend is unavailable in this build
/// (e.g. an optional driver feature wasn't compiled in) — the registry logs
/// and moves on rather than treating that as a hard error.
pub type ConnectorFactory = fn() -> Option<ConnectorHandle>;

#[derive(Default)]
pub struct ConnectorRegistry {
    handles: std::sync::RwLock<HashMap<String, ConnectorHandle>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes `factory`; if it returns a handle, registers it under
    /// `kind.to_lowercase()` and returns `true`. If the factory declines
    /// (backend unavailable), logs a warning and returns `false` without
    /// touching the registry.
    pub fn register_if_available(&self, kind: &str, factory: ConnectorFactory) -> bool {
        let key = kind.to_lowercase();
        match factory() {
            Some(handle) => {
                self.handles.write().expect("connector registry lock poisoned").insert(key, handle);
                true
            }
            None => {
                warn!(connector_kind = %kind, "connector backend unavailable, skipping registration");
                false
            }
        }
    }

    pub fn get(&self, kind: &str) -> ConnectorResult<ConnectorHandle> {
        let key = kind.to_lowercase();
        self.handles
            .read()
            .expect("connector registry lock poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownKind(kind.to_string()))
    }

    pub fn kinds(&self) -> Vec<String> {
        self.handles.read().expect("connector registry lock poisoned").keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Dummy;

    #[async_trait]
    impl Connectable for Dummy {
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

    fn dummy_factory() -> Option<ConnectorHandle> {
        Some(ConnectorHandleBuilder::new("dummy", Arc::new(Dummy)).build())
    }

    fn unavailable_factory() -> Option<ConnectorHandle> {
        None
    }

    #[test]
    fn registers_and_looks_up_case_insensitively() {
        let registry = ConnectorRegistry::new();
        assert!(registry.register_if_available("Dummy", dummy_factory));
        let handle = registry.get("DUMMY").unwrap();
        assert_eq!(handle.kind(), "dummy");
    }

    #[test]
    fn unavailable_backend_declines_without_erroring() {
        let registry = ConnectorRegistry::new();
        assert!(!registry.register_if_available("missing", unavailable_factory));
        assert!(matches!(registry.get("missing"), Err(ConnectorError::UnknownKind(_))));
    }

    #[test]
    fn capability_not_implemented_surfaces_unsupported_capability() {
        let registry = ConnectorRegistry::new();
        registry.register_if_available("dummy", dummy_factory);
        let handle = registry.get("dummy").unwrap();
        assert!(matches!(handle.as_batch_reader(), Err(ConnectorError::UnsupportedCapability { .. })));
    }
}
