//! Quarantine routing for rows the `validate` operator marks as failing.
//! A node with `quarantine_asset_ref` set writes failing
//! rows to that asset via a `BatchWriter`; otherwise rows land in an
//! in-memory [`ForensicBuffer`] the control plane can read back through
//! `StepRun::sample_data`.

use std::collections::VecDeque;

use serde_json::{Map, Value};

/// A byte-capped ring buffer of quarantined rows. Oldest rows are dropped
/// first once the cap is hit — this is a debugging aid, not a durable
/// record, so silent truncation under pressure is the right tradeoff.
pub struct ForensicBuffer {
    max_bytes: usize,
    current_bytes: usize,
    rows: VecDeque<(Map<String, Value>, usize)>,
}

impl ForensicBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes, current_bytes: 0, rows: VecDeque::new() }
    }

    pub fn push(&mut self, row: Map<String, Value>) {
        let size = serde_json::to_vec(&row).map(|b| b.len()).unwrap_or(0);
        self.current_bytes += size;
        self.rows.push_back((row, size));
        while self.current_bytes > self.max_bytes {
            match self.rows.pop_front() {
                Some((_, dropped_size)) => self.current_bytes -= dropped_size,
                None => break,
            }
        }
    }

    pub fn rows(&self) -> Vec<Value> {
        self.rows.iter().map(|(row, _)| Value::Object(row.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where quarantined rows for one node go: a configured asset (written by
/// the agent via the connector registry) or the in-process forensic
/// buffer.
pub enum QuarantineSink {
    Asset { asset: String },
    Buffer(ForensicBuffer),
}

impl QuarantineSink {
    pub fn buffered(max_bytes: usize) -> Self {
        Self::Buffer(ForensicBuffer::new(max_bytes))
    }

    pub fn for_asset(asset: impl Into<String>) -> Self {
        Self::Asset { asset: asset.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("id".to_string(), Value::from(id));
        m
    }

    #[test]
    fn drops_oldest_rows_once_the_byte_cap_is_exceeded() {
        let mut buffer = ForensicBuffer::new(20);
        for id in 0..20 {
            buffer.push(row(id));
        }
        assert!(buffer.len() < 20);
        assert!(!buffer.is_empty());
    }
}
