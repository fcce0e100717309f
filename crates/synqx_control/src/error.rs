//! Failure surface for the control plane: job/agent lookups, pipeline
//! definition validation, and the storage/serialization errors beneath them.

use synqx_ids::{AgentId, JobId};

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("job {0} is not in a cancellable state")]
    NotCancellable(JobId),
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
    #[error("agent credential rejected")]
    AuthRejected,
    #[error("malformed pipeline definition: {0}")]
    InvalidDefinition(String),
    #[error("identifier parse error: {0}")]
    IdParse(#[from] synqx_ids::IdParseError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ControlResult<T> = std::result::Result<T, ControlError>;
