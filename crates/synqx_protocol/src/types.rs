//! Canonical domain types shared across every SynqX crate.
//!
//! These mirror the Data Model in the platform specification almost
//! verbatim: each entity here is semantic, not tied to any one storage
//! schema — `synqx_control` maps them onto SQL tables, `synqx_executor`
//! constructs and mutates them in memory, `synqx_protocol::http_types`
//! exposes thinner wire variants of the same ideas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use synqx_ids::{
    AgentId, AssetId, ConnectionId, EphemeralJobId, JobId, NodeId, PipelineId, PipelineRunId,
    PipelineVersionId, StepRunId, WorkspaceId,
};

// ============================================================================
// Enums
// ============================================================================

/// Kind of asset backing a node's source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Table,
    View,
    File,
    Collection,
    Topic,
    Kind,
    DomainEntity,
}

/// Node role within a pipeline DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatorType {
    Extract,
    Transform,
    Load,
    System,
}

/// Kind of edge connecting two nodes. Only `DataFlow` exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    DataFlow,
}

/// How a `write_batch`/`write_staged` call should treat existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Append,
    Replace,
    Overwrite,
    Upsert,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
            WriteMode::Overwrite => "overwrite",
            WriteMode::Upsert => "upsert",
        }
    }

    /// Whether a retry of this write mode is safe to re-attempt without
    /// double-applying rows: replace/overwrite always are, append only
    /// when writing with an idempotency key.
    pub fn idempotent_on_retry(&self, has_idempotency_key: bool) -> bool {
        match self {
            WriteMode::Replace | WriteMode::Overwrite => true,
            WriteMode::Append => has_idempotency_key,
            WriteMode::Upsert => true,
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Schema evolution policy applied when a LOAD node observes drift against
/// its destination asset's schema snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaEvolutionPolicy {
    #[default]
    Strict,
    AddColumns,
    Ignore,
}

/// Job/run-level status. Shared by `Job`, `PipelineRun` uses a narrower
/// subset implicitly (a run only ever reaches a terminal state once it has
/// started, i.e. never `Pending`/`Queued`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Retrying,
    Cancelled,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Pending,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
        JobStatus::Retrying,
        JobStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Validates a single state transition:
    /// PENDING→QUEUED→RUNNING→{SUCCESS|FAILED|CANCELLED}; RETRYING re-enters
    /// QUEUED.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Retrying)
                | (Retrying, Queued)
                | (Failed, Retrying)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
            JobStatus::Retrying => "RETRYING",
            JobStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILED" => Ok(JobStatus::Failed),
            "RETRYING" => Ok(JobStatus::Retrying),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Per-node/per-StepRun execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Retrying,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Success | StepState::Failed | StepState::Skipped)
    }
}

/// Retry backoff strategy for both node-level and job-level retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    #[default]
    Fixed,
    Exponential,
    Linear,
}

impl RetryStrategy {
    /// Delay before attempt number `attempt` (1-indexed), before jitter.
    pub fn base_delay(&self, base: std::time::Duration, attempt: u32) -> std::time::Duration {
        match self {
            RetryStrategy::Fixed => base,
            RetryStrategy::Linear => base * attempt.max(1),
            RetryStrategy::Exponential => base * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }
}

/// Liveness/operational status of a remote agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    #[default]
    Online,
    Offline,
    Draining,
}

/// Job type for ephemeral (non-pipeline) work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EphemeralJobType {
    Explorer,
    Metadata,
    Test,
    System,
    File,
    Pipeline,
}

/// CDC row-level change marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CdcEvent {
    Insert,
    Update,
    Delete,
}

/// Health/reachability state of a `Connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionHealth {
    #[default]
    Unknown,
    Healthy,
    Unreachable,
}

// ============================================================================
// Core entities
// ============================================================================

/// An external system endpoint. Secrets in `config` are resolved
/// just-in-time via the vault interface (out of scope here); this struct
/// never carries plaintext secrets at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub workspace_id: WorkspaceId,
    pub connector_kind: String,
    pub config: serde_json::Value,
    pub staging_connection_ref: Option<ConnectionId>,
    pub health_state: ConnectionHealth,
}

/// A schema snapshot attached to an `Asset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub version: u32,
    pub hash: String,
    pub columns: Vec<SchemaColumnSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaColumnSpec {
    pub name: String,
    pub data_type: ColumnDataType,
    pub nullable: bool,
}

/// Canonical column data type, independent of any connector's native types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDataType {
    Int,
    Float,
    Bool,
    String,
    Datetime,
    Date,
}

/// A logical table/collection living on a `Connection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub connection_id: ConnectionId,
    pub name: String,
    pub fqn: String,
    pub asset_type: AssetType,
    pub is_source: bool,
    pub is_destination: bool,
    pub is_incremental: bool,
    pub schema: Option<SchemaSnapshot>,
}

/// Immutable pipeline metadata; owns an ordered history of versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub agent_group: Option<String>,
    pub cron_schedule: Option<String>,
    pub retry_policy: RetryPolicy,
    pub sla: Option<SlaConfig>,
    pub tags: Vec<String>,
    pub priority: i32,
    pub published_version: Option<PipelineVersionId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: RetryStrategy,
    pub retry_delay_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            strategy: RetryStrategy::Fixed,
            retry_delay_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlaConfig {
    pub max_duration_seconds: u64,
}

/// A snapshot of a pipeline's DAG at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineVersion {
    pub id: PipelineVersionId,
    pub pipeline_id: PipelineId,
    pub version_number: u32,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub notes: Option<String>,
    pub published: bool,
}

/// A node in a pipeline DAG, addressed by its `node_id` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub operator_type: OperatorType,
    pub operator_class: String,
    pub config: serde_json::Value,
    pub retry_policy: RetryPolicy,
    pub timeout_seconds: Option<u64>,
    pub source_asset_ref: Option<AssetId>,
    pub destination_asset_ref: Option<AssetId>,
    pub connection_ref: Option<ConnectionId>,
    pub guardrails: Vec<Guardrail>,
    pub data_contract: Option<serde_json::Value>,
    pub quarantine_asset_ref: Option<AssetId>,
    pub write_strategy: WriteMode,
    pub schema_evolution_policy: SchemaEvolutionPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Guardrail {
    pub max_rows: Option<u64>,
    pub max_bytes: Option<u64>,
    pub max_wall_time_seconds: Option<u64>,
}

/// A directed edge between two nodes in the same version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub edge_type: EdgeType,
}

/// A unit of scheduled work: one pipeline-version execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub pipeline_ref: PipelineId,
    pub pipeline_version_ref: PipelineVersionId,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    pub agent_group: String,
    pub worker_id: Option<AgentId>,
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub infra_error: Option<String>,
    pub is_backfill: bool,
    pub backfill_config: Option<serde_json::Value>,
}

/// Exactly one per job-attempt-that-actually-starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: PipelineRunId,
    pub job_id: JobId,
    pub records_in: u64,
    pub records_out: u64,
    pub records_failed: u64,
    pub bytes_processed: u64,
    pub duration_ms: Option<u64>,
    pub failed_step_ref: Option<NodeId>,
    pub status: JobStatus,
}

/// Exactly one per node per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub id: StepRunId,
    pub pipeline_run_id: PipelineRunId,
    pub node_id: NodeId,
    pub state: StepState,
    pub records_in: u64,
    pub records_out: u64,
    pub records_filtered: u64,
    pub records_error: u64,
    pub bytes_processed: u64,
    pub cpu_samples: Vec<f64>,
    pub mem_samples: Vec<u64>,
    pub sample_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub lineage_map: Option<HashMap<String, Vec<String>>>,
}

/// Highest-seen value of a monotone column, or an opaque resume token,
/// keyed by (pipeline_version, node_id, asset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watermark {
    pub pipeline_version_id: PipelineVersionId,
    pub node_id: NodeId,
    pub asset_id: AssetId,
    pub value: WatermarkValue,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WatermarkValue {
    Integer(i64),
    Text(String),
    Token(String),
}

impl WatermarkValue {
    /// Watermarks are monotone non-decreasing.
    /// Opaque tokens have no ordering, so any new token is accepted as an
    /// advance (the CDC reader is the sole source of truth for token
    /// freshness); numeric/text watermarks only advance forward.
    pub fn is_advance_over(&self, previous: Option<&WatermarkValue>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        match (previous, self) {
            (WatermarkValue::Integer(prev), WatermarkValue::Integer(next)) => next >= prev,
            (WatermarkValue::Text(prev), WatermarkValue::Text(next)) => next >= prev,
            (WatermarkValue::Token(_), WatermarkValue::Token(_)) => true,
            _ => true,
        }
    }
}

/// A remote worker process identified by tag-based routing group(s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub workspace_id: WorkspaceId,
    pub client_id: String,
    pub hashed_secret: String,
    pub display_name: String,
    pub groups: Vec<String>,
    pub status: AgentStatus,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub version: Option<String>,
    pub system_info: Option<serde_json::Value>,
}

impl Agent {
    /// An agent is ONLINE only if its heartbeat is within the liveness
    /// window, regardless of its stored `status` column.
    pub fn effective_status(&self, now: DateTime<Utc>, liveness_window_secs: i64) -> AgentStatus {
        if self.status == AgentStatus::Draining {
            return AgentStatus::Draining;
        }
        match self.last_heartbeat_at {
            Some(ts) if (now - ts).num_seconds() <= liveness_window_secs => AgentStatus::Online,
            _ => AgentStatus::Offline,
        }
    }

    /// Case-insensitive tag-group membership test.
    pub fn is_in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
    }
}

/// A short-lived task that bypasses the DAG machinery but shares the
/// pipeline job's dispatch routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralJob {
    pub id: EphemeralJobId,
    pub workspace_id: WorkspaceId,
    pub user: String,
    pub connection_id: Option<ConnectionId>,
    pub job_type: EphemeralJobType,
    pub agent_group: String,
    pub status: JobStatus,
    pub worker_id: Option<AgentId>,
    pub payload: serde_json::Value,
    pub result_summary: Option<serde_json::Value>,
    pub result_sample: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_transitions_follow_the_documented_state_machine() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Success));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Retrying));
        assert!(JobStatus::Retrying.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Success));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn job_status_round_trips_through_display_and_from_str() {
        for status in JobStatus::ALL {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, *status);
        }
    }

    #[test]
    fn write_mode_idempotence_rules_hold() {
        assert!(WriteMode::Replace.idempotent_on_retry(false));
        assert!(WriteMode::Overwrite.idempotent_on_retry(false));
        assert!(!WriteMode::Append.idempotent_on_retry(false));
        assert!(WriteMode::Append.idempotent_on_retry(true));
    }

    #[test]
    fn agent_offline_when_heartbeat_stale() {
        let now = Utc::now();
        let mut agent = Agent {
            id: AgentId::new(),
            workspace_id: WorkspaceId::new(),
            client_id: "abc".into(),
            hashed_secret: "hash".into(),
            display_name: "worker-1".into(),
            groups: vec!["AWS-EAST".into()],
            status: AgentStatus::Online,
            last_heartbeat_at: Some(now - chrono::Duration::minutes(5)),
            ip_address: None,
            version: None,
            system_info: None,
        };
        assert_eq!(agent.effective_status(now, 120), AgentStatus::Offline);
        agent.last_heartbeat_at = Some(now);
        assert_eq!(agent.effective_status(now, 120), AgentStatus::Online);
    }

    #[test]
    fn agent_group_matching_is_case_insensitive() {
        let agent = Agent {
            id: AgentId::new(),
            workspace_id: WorkspaceId::new(),
            client_id: "abc".into(),
            hashed_secret: "hash".into(),
            display_name: "worker-1".into(),
            groups: vec!["AWS-East".into()],
            status: AgentStatus::Online,
            last_heartbeat_at: Some(Utc::now()),
            ip_address: None,
            version: None,
            system_info: None,
        };
        assert!(agent.is_in_group("aws-east"));
        assert!(!agent.is_in_group("gcp"));
    }

    #[test]
    fn watermark_integer_must_not_regress() {
        let prev = WatermarkValue::Integer(100);
        assert!(WatermarkValue::Integer(150).is_advance_over(Some(&prev)));
        assert!(!WatermarkValue::Integer(50).is_advance_over(Some(&prev)));
    }
}
