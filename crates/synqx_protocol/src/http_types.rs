//! Wire DTOs for the (unimplemented) HTTP API surface and for the agent
//! registration/heartbeat/lease/progress exchange that rides over it
//! conceptually even though the transport itself is ZeroMQ (see `OpCode`
//! in the crate root). These types exist so request/response shapes are
//! pinned down even though no HTTP server is wired up — spec Non-goal:
//! "HTTP API surface".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentStatus, JobStatus};
use synqx_ids::{AgentId, JobId, NodeId, PipelineRunId, WorkspaceId};

/// POST /agents/register request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegisterRequest {
    pub workspace_id: WorkspaceId,
    pub client_id: String,
    pub display_name: String,
    pub groups: Vec<String>,
    pub version: Option<String>,
}

/// Response to a successful registration. `api_key` is returned exactly
/// once, in plaintext; the control plane stores only its SHA-256 hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegisterResponse {
    pub agent_id: AgentId,
    pub api_key: String,
}

/// POST /agents/{id}/heartbeat request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHeartbeatRequest {
    pub agent_id: AgentId,
    pub system_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHeartbeatResponse {
    pub accepted: bool,
    pub effective_status: AgentStatus,
}

/// POST /agents/{id}/lease — long-poll style work pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub agent_id: AgentId,
    pub groups: Vec<String>,
    pub max_jobs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub jobs: Vec<LeasedJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeasedJob {
    pub job_id: JobId,
    pub plan: serde_json::Value,
    pub secret_refs: Vec<String>,
}

/// POST /jobs/{id}/progress — streamed while a job is RUNNING.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgressReport {
    pub job_id: JobId,
    pub pipeline_run_id: Option<PipelineRunId>,
    pub node_id: Option<NodeId>,
    pub records_in: u64,
    pub records_out: u64,
    pub bytes_processed: u64,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// POST /jobs/{id}/complete — terminal report for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompleteReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub failed_node_id: Option<NodeId>,
    pub duration_ms: u64,
}

/// A coarse event surfaced on the job/run/step activity stream, the shape
/// an eventual UI or webhook subscriber would consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub workspace_id: WorkspaceId,
    pub job_id: JobId,
    pub at: DateTime<Utc>,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobQueued,
    JobStarted,
    JobSucceeded,
    JobFailed,
    JobCancelled,
    StepStarted,
    StepSucceeded,
    StepFailed,
    AgentOnline,
    AgentOffline,
    SlaBreach,
}

/// Generic error envelope returned by any HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_register_response_serializes_api_key_in_plaintext_once() {
        let resp = AgentRegisterResponse {
            agent_id: AgentId::new(),
            api_key: "plaintext-secret".into(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("plaintext-secret"));
    }

    #[test]
    fn event_type_round_trips_snake_case() {
        let json = serde_json::to_string(&EventType::SlaBreach).unwrap();
        assert_eq!(json, "\"sla_breach\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::SlaBreach);
    }
}
