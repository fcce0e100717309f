//! `ExecutorError`: the failure surface for one pipeline run. A run-ending
//! error always carries the `node_id` it happened at, matching
//! `PipelineRun::failed_step_ref` in the data model.

use synqx_ids::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("node '{node_id}' exceeded its guardrail: {reason}")]
    GuardrailBreach { node_id: NodeId, reason: String },
    #[error("node '{node_id}' failed after exhausting {attempts} attempt(s): {source}")]
    RetriesExhausted { node_id: NodeId, attempts: u32, source: Box<ExecutorError> },
    #[error("node '{node_id}' timed out after {timeout_seconds}s")]
    NodeTimeout { node_id: NodeId, timeout_seconds: u64 },
    #[error("run cancelled")]
    Cancelled,
    #[error("dag error: {0}")]
    Dag(#[from] synqx_dag::graph::DagError),
    #[error("operator error on node '{node_id}': {source}")]
    Operator { node_id: NodeId, source: synqx_runtime::OperatorError },
    #[error("connector error on node '{node_id}': {source}")]
    Connector { node_id: NodeId, source: synqx_connectors::ConnectorError },
    #[error("node '{node_id}' has no registered operator for class '{operator_class}'")]
    UnknownOperatorClass { node_id: NodeId, operator_class: String },
    #[error("node '{node_id}' is an EXTRACT node but carries no connection_ref")]
    MissingConnection { node_id: NodeId },
    #[error("{0}")]
    Other(String),
}

pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
