//! The `Operator` trait every built-in and user-defined transform
//! implements, plus the chunk-event callback hook the executor uses to
//! sample data and compute lineage without coupling the runtime to any one
//! observability backend.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::Stream;
use thiserror::Error;

use crate::chunk::Chunk;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("invalid config for operator '{operator}': {reason}")]
    InvalidConfig { operator: String, reason: String },
    #[error("operator '{operator}' does not support multi-input transform")]
    MultiInputUnsupported { operator: String },
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("{0}")]
    Other(String),
}

pub type OperatorResult<T> = std::result::Result<T, OperatorError>;

/// A boxed stream of chunks flowing along one edge.
pub type ChunkStream = Pin<Box<dyn Stream<Item = OperatorResult<Chunk>> + Send>>;

/// Where a chunk sits in a node's processing, for the `on_chunk`
/// callback contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDirection {
    Input,
    Output,
    Intermediate,
    Quarantine,
}

/// A notification fired for every chunk an operator processes, consumed by
/// the executor to update `StepRun` counters, feed `sample_data`, and
/// forward progress to the control plane. Kept as a plain callback rather
/// than a channel so operators stay synchronous-friendly and testable
/// without spinning up an async runtime.
#[derive(Debug, Clone)]
pub struct ChunkEvent {
    pub node_id: String,
    pub direction: ChunkDirection,
    pub rows: usize,
    pub bytes: usize,
    pub filtered_count: Option<usize>,
    pub error_count: Option<usize>,
}

impl ChunkEvent {
    pub fn output(node_id: impl Into<String>, rows: usize, bytes: usize) -> Self {
        Self {
            node_id: node_id.into(),
            direction: ChunkDirection::Output,
            rows,
            bytes,
            filtered_count: None,
            error_count: None,
        }
    }

    pub fn quarantine(node_id: impl Into<String>, rows: usize, bytes: usize, error_count: usize) -> Self {
        Self {
            node_id: node_id.into(),
            direction: ChunkDirection::Quarantine,
            rows,
            bytes,
            filtered_count: None,
            error_count: Some(error_count),
        }
    }
}

pub type OnChunk = Arc<dyn Fn(ChunkEvent) + Send + Sync>;

/// A single pipeline transform. Implementors are expected to be cheap to
/// construct per job (config validation happens once, up front) and to
/// process chunks without unbounded buffering wherever the operator's
/// semantics allow streaming (aggregate/sort/dedup are the documented
/// exceptions that must buffer).
pub trait Operator: Send + Sync {
    /// Stable, lowercase identifier matching `Node::operator_class`.
    fn name(&self) -> &'static str;

    /// Validates `config` at plan-build time, before any chunk flows,
    /// so misconfiguration surfaces as a plan error rather than a
    /// mid-run failure.
    fn validate_config(&self, config: &serde_json::Value) -> OperatorResult<()>;

    /// Transforms a single upstream chunk stream into this operator's
    /// output stream. The default single-input entry point; operators
    /// with more than one input (join, union, merge) implement
    /// `transform_multi` instead and leave this as the default error.
    fn transform(&self, _input: ChunkStream, _config: &serde_json::Value) -> OperatorResult<ChunkStream> {
        Err(OperatorError::MultiInputUnsupported { operator: self.name().to_string() })
    }

    /// Transforms N upstream chunk streams (keyed by the upstream node id
    /// that produced each) into one output stream. Single-input operators
    /// inherit the default, which routes to `transform` using the sole
    /// entry in `inputs`.
    fn transform_multi(
        &self,
        mut inputs: HashMap<String, ChunkStream>,
        config: &serde_json::Value,
    ) -> OperatorResult<ChunkStream> {
        if inputs.len() != 1 {
            return Err(OperatorError::MultiInputUnsupported { operator: self.name().to_string() });
        }
        let (_, only) = inputs.drain().next().expect("checked len == 1 above");
        self.transform(only, config)
    }

    /// Maps this operator's output column names back to the set of input
    /// column names each one was derived from. Used to compose end-to-end
    /// lineage across a pipeline run. Defaults to identity (every output
    /// column traces back to the input column of the same name), which is
    /// correct for filter/sort/dedup/limit and wrong-but-safe (over-wide)
    /// for anything that renames or drops columns — those operators
    /// override this.
    fn lineage_map(&self, input_columns: &[String], _config: &serde_json::Value) -> HashMap<String, HashSet<String>> {
        input_columns
            .iter()
            .map(|c| (c.clone(), HashSet::from([c.clone()])))
            .collect()
    }
}

/// Looks up an `Operator` implementation by its `operator_class` name.
#[derive(Default)]
pub struct OperatorRegistry {
    operators: HashMap<&'static str, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operator: Arc<dyn Operator>) {
        self.operators.insert(operator.name(), operator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators.get(name).cloned()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::operators::register_all(&mut registry);
        registry
    }
}
