//! `scd_type_2` (blocking multi-input): two parents `delta` and
//! `target`. Compares `delta` against the current (`is_current = true`) rows
//! of `target` on `primary_key`, emitting only the rows that change:
//! new records (marked current), changed records (new current row), and
//! superseded target rows (closed with `effective_to = now`).

use std::collections::HashMap as Map;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, rows_to_batch};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeySpec {
    Single(String),
    Many(Vec<String>),
}

impl KeySpec {
    fn columns(&self) -> Vec<String> {
        match self {
            KeySpec::Single(s) => vec![s.clone()],
            KeySpec::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScdConfig {
    delta_node: String,
    target_node: String,
    primary_key: KeySpec,
    compare_columns: Vec<String>,
    #[serde(default = "default_effective_from")]
    effective_from_column: String,
    #[serde(default = "default_effective_to")]
    effective_to_column: String,
    #[serde(default = "default_is_current")]
    is_current_column: String,
}

fn default_effective_from() -> String {
    "synqx_effective_from".to_string()
}

fn default_effective_to() -> String {
    "synqx_effective_to".to_string()
}

fn default_is_current() -> String {
    "synqx_is_current".to_string()
}

fn key(row: &JsonMap<String, Value>, cols: &[String]) -> String {
    let values: Vec<Value> = cols.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
    serde_json::to_string(&values).expect("Value serialization never fails")
}

fn changed(delta_row: &JsonMap<String, Value>, target_row: &JsonMap<String, Value>, compare: &[String]) -> bool {
    compare.iter().any(|c| delta_row.get(c) != target_row.get(c))
}

pub struct ScdType2Operator;

impl Operator for ScdType2Operator {
    fn name(&self) -> &'static str {
        "scd_type_2"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: ScdConfig = parse_config(self.name(), config)?;
        if cfg.compare_columns.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "compare_columns must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform_multi(&self, inputs: Map<String, ChunkStream>, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: ScdConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let pk = cfg.primary_key.columns();

        Ok(crate::operators::util::multi_blocking(inputs, move |mut named| {
            let delta_chunks = named.remove(&cfg.delta_node).ok_or_else(|| OperatorError::InvalidConfig {
                operator: "scd_type_2".to_string(),
                reason: format!("missing delta parent '{}'", cfg.delta_node),
            })?;
            let target_chunks = named.remove(&cfg.target_node).ok_or_else(|| OperatorError::InvalidConfig {
                operator: "scd_type_2".to_string(),
                reason: format!("missing target parent '{}'", cfg.target_node),
            })?;

            let mut delta_rows = Vec::new();
            for chunk in &delta_chunks {
                delta_rows.extend(batch_to_rows(chunk.record_batch()));
            }
            let mut target_rows = Vec::new();
            for chunk in &target_chunks {
                target_rows.extend(batch_to_rows(chunk.record_batch()));
            }

            let mut current_by_key: Map<String, usize> = Map::new();
            for (i, row) in target_rows.iter().enumerate() {
                let is_current = row.get(&cfg.is_current_column).and_then(Value::as_bool).unwrap_or(false);
                if is_current {
                    current_by_key.insert(key(row, &pk), i);
                }
            }

            let now = Value::from(Utc::now().to_rfc3339());
            let mut out_rows = Vec::new();

            for delta_row in &delta_rows {
                let k = key(delta_row, &pk);
                match current_by_key.get(&k) {
                    None => {
                        let mut row = delta_row.clone();
                        row.insert(cfg.effective_from_column.clone(), now.clone());
                        row.insert(cfg.effective_to_column.clone(), Value::Null);
                        row.insert(cfg.is_current_column.clone(), Value::Bool(true));
                        out_rows.push(row);
                    }
                    Some(&idx) => {
                        if changed(delta_row, &target_rows[idx], &cfg.compare_columns) {
                            let mut closed = target_rows[idx].clone();
                            closed.insert(cfg.effective_to_column.clone(), now.clone());
                            closed.insert(cfg.is_current_column.clone(), Value::Bool(false));
                            out_rows.push(closed);

                            let mut row = delta_row.clone();
                            row.insert(cfg.effective_from_column.clone(), now.clone());
                            row.insert(cfg.effective_to_column.clone(), Value::Null);
                            row.insert(cfg.is_current_column.clone(), Value::Bool(true));
                            out_rows.push(row);
                        }
                    }
                }
            }

            let schema = infer_schema(&out_rows, target_chunks.first().map(|c| c.schema()));
            Ok(vec![Chunk::new(rows_to_batch(schema, &out_rows)?)])
        }))
    }
}

fn infer_schema(rows: &[JsonMap<String, Value>], fallback: Option<arrow::datatypes::SchemaRef>) -> arrow::datatypes::SchemaRef {
    use arrow::datatypes::{DataType, Field, Schema};
    if let Some(first) = rows.first() {
        let fields: Vec<Field> = first
            .iter()
            .map(|(name, value)| {
                let dt = match value {
                    Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
                    Value::Number(_) => DataType::Float64,
                    Value::Bool(_) => DataType::Boolean,
                    _ => DataType::Utf8,
                };
                Field::new(name, dt, true)
            })
            .collect();
        return std::sync::Arc::new(Schema::new(fields));
    }
    fallback.unwrap_or_else(|| std::sync::Arc::new(Schema::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    fn delta_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("status", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![1, 2])), Arc::new(StringArray::from(vec!["active", "new"]))],
        )
        .unwrap()
    }

    fn target_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("synqx_is_current", DataType::Boolean, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["inactive"])),
                Arc::new(BooleanArray::from(vec![true])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn emits_closed_row_and_new_current_row_on_change() {
        let mut inputs: std::collections::HashMap<String, ChunkStream> = std::collections::HashMap::new();
        inputs.insert("d".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(delta_batch()))])));
        inputs.insert("t".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(target_batch()))])));

        let config = serde_json::json!({
            "delta_node": "d",
            "target_node": "t",
            "primary_key": "id",
            "compare_columns": ["status"],
        });
        let out = ScdType2Operator.transform_multi(inputs, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        // id=1 changed -> 1 closed + 1 new current; id=2 is a brand new record -> 1 new current.
        assert_eq!(chunks[0].as_ref().unwrap().num_rows(), 3);
    }
}
