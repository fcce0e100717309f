//! The result of one `Executor::run` call.

use synqx_ids::NodeId;
use synqx_protocol::types::{JobStatus, StepRun, Watermark};

/// Everything the control plane needs to finish a job after a run
/// completes. Watermarks are candidates only — the executor never applies
/// them; the control plane's `complete_job` does so exactly once, and only
/// when `status == JobStatus::Success`, so a failed run never advances a
/// watermark past data it didn't actually finish processing.
#[derive(Debug, Clone)]
pub struct PipelineRunOutcome {
    pub status: JobStatus,
    pub step_runs: Vec<StepRun>,
    pub candidate_watermarks: Vec<Watermark>,
    pub failed_step_ref: Option<NodeId>,
    pub records_in: u64,
    pub records_out: u64,
    pub records_failed: u64,
    pub bytes_processed: u64,
    pub duration_ms: u64,
}

impl PipelineRunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}
