//! `sort` (blocking): accumulates the full input and emits it
//! sorted by one or more columns, ascending unless overridden.

use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, blocking, concat_chunks, rows_to_batch};

/// Accepts either a single bool (ascending for every column named in
/// `columns`) or a per-column list giving one ascending flag per column.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Ascending {
    Single(bool),
    PerColumn(Vec<bool>),
}

#[derive(Debug, Deserialize)]
struct SortConfig {
    columns: Vec<String>,
    #[serde(default = "default_ascending")]
    ascending: Ascending,
}

fn default_ascending() -> Ascending {
    Ascending::Single(true)
}

fn ascending_for(cfg: &SortConfig, idx: usize) -> bool {
    match &cfg.ascending {
        Ascending::Single(b) => *b,
        Ascending::PerColumn(list) => list.get(idx).copied().unwrap_or(true),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater, // nulls sort last regardless of direction
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

pub struct SortOperator;

impl Operator for SortOperator {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: SortConfig = parse_config(self.name(), config)?;
        if cfg.columns.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "columns must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: SortConfig = parse_config(self.name(), config)?;
        Ok(blocking(input, move |chunks| {
            let Some(combined) = concat_chunks(&chunks)? else {
                return Ok(vec![]);
            };
            let schema = combined.schema();
            let mut rows = batch_to_rows(&combined);
            rows.sort_by(|a, b| {
                for (i, col) in cfg.columns.iter().enumerate() {
                    let ord = compare_values(a.get(col).unwrap_or(&Value::Null), b.get(col).unwrap_or(&Value::Null));
                    let ord = if ascending_for(&cfg, i) { ord } else { ord.reverse() };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
            Ok(vec![Chunk::new(rows_to_batch(schema, &rows)?)])
        }))
    }
}
