//! Per-node resource guardrails, checked after every chunk: a
//! breach fails the node immediately rather than letting a runaway node
//! keep consuming chunks until it naturally finishes.

use std::time::Instant;

use synqx_ids::NodeId;
use synqx_protocol::types::Guardrail;

use crate::error::ExecutorError;

/// Running totals for one node's guardrail check, reset at the start of
/// each run attempt.
pub struct GuardrailTracker {
    guardrail: Guardrail,
    rows: u64,
    bytes: u64,
    started_at: Instant,
}

impl GuardrailTracker {
    pub fn new(guardrail: Guardrail) -> Self {
        Self { guardrail, rows: 0, bytes: 0, started_at: Instant::now() }
    }

    /// Folds in one chunk's contribution and checks every configured limit.
    pub fn observe(&mut self, node_id: &NodeId, rows: u64, bytes: u64) -> Result<(), ExecutorError> {
        self.rows += rows;
        self.bytes += bytes;

        if let Some(max_rows) = self.guardrail.max_rows {
            if self.rows > max_rows {
                return Err(ExecutorError::GuardrailBreach {
                    node_id: node_id.clone(),
                    reason: format!("max_rows exceeded: {} > {max_rows}", self.rows),
                });
            }
        }
        if let Some(max_bytes) = self.guardrail.max_bytes {
            if self.bytes > max_bytes {
                return Err(ExecutorError::GuardrailBreach {
                    node_id: node_id.clone(),
                    reason: format!("max_bytes exceeded: {} > {max_bytes}", self.bytes),
                });
            }
        }
        if let Some(max_wall_time) = self.guardrail.max_wall_time_seconds {
            if self.started_at.elapsed().as_secs() > max_wall_time {
                return Err(ExecutorError::GuardrailBreach {
                    node_id: node_id.clone(),
                    reason: format!("max_wall_time_seconds exceeded: {max_wall_time}s"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaches_max_rows_once_the_running_total_passes_it() {
        let mut tracker = GuardrailTracker::new(Guardrail { max_rows: Some(100), max_bytes: None, max_wall_time_seconds: None });
        let node = NodeId::new("n1");
        assert!(tracker.observe(&node, 60, 0).is_ok());
        assert!(tracker.observe(&node, 60, 0).is_err());
    }

    #[test]
    fn no_configured_limits_never_breaches() {
        let mut tracker = GuardrailTracker::new(Guardrail { max_rows: None, max_bytes: None, max_wall_time_seconds: None });
        let node = NodeId::new("n1");
        assert!(tracker.observe(&node, u64::MAX / 2, u64::MAX / 2).is_ok());
    }
}
