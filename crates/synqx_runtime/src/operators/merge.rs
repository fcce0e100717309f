//! `merge` (upsert, blocking multi-input): two parents `primary`
//! and `delta`. Semantics are anti-join + concat: primary rows whose `on`
//! key also appears in delta are
//! dropped, then every delta row is appended once.

use std::collections::HashMap as Map;
use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, rows_to_batch, union_schema};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OnSpec {
    Single(String),
    Many(Vec<String>),
}

impl OnSpec {
    fn columns(&self) -> Vec<String> {
        match self {
            OnSpec::Single(s) => vec![s.clone()],
            OnSpec::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MergeConfig {
    primary_node: String,
    delta_node: String,
    on: OnSpec,
}

fn key(row: &serde_json::Map<String, Value>, cols: &[String]) -> String {
    let values: Vec<Value> = cols.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
    serde_json::to_string(&values).expect("Value serialization never fails")
}

pub struct MergeOperator;

impl Operator for MergeOperator {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        parse_config::<MergeConfig>(self.name(), config).map(|_| ())
    }

    fn transform_multi(&self, inputs: Map<String, ChunkStream>, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: MergeConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let on = cfg.on.columns();

        Ok(crate::operators::util::multi_blocking(inputs, move |mut named| {
            let primary_chunks = named.remove(&cfg.primary_node).ok_or_else(|| OperatorError::InvalidConfig {
                operator: "merge".to_string(),
                reason: format!("missing primary parent '{}'", cfg.primary_node),
            })?;
            let delta_chunks = named.remove(&cfg.delta_node).ok_or_else(|| OperatorError::InvalidConfig {
                operator: "merge".to_string(),
                reason: format!("missing delta parent '{}'", cfg.delta_node),
            })?;

            let mut delta_rows = Vec::new();
            for chunk in &delta_chunks {
                delta_rows.extend(batch_to_rows(chunk.record_batch()));
            }
            let delta_keys: HashSet<String> = delta_rows.iter().map(|r| key(r, &on)).collect();

            let schema = match (primary_chunks.first(), delta_chunks.first()) {
                (Some(p), Some(d)) => union_schema(p.schema().as_ref(), d.schema().as_ref()),
                (Some(p), None) => p.schema(),
                (None, Some(d)) => d.schema(),
                (None, None) => return Ok(vec![]),
            };

            let mut out_rows = Vec::new();
            for chunk in &primary_chunks {
                for row in batch_to_rows(chunk.record_batch()) {
                    if !delta_keys.contains(&key(&row, &on)) {
                        out_rows.push(row);
                    }
                }
            }
            out_rows.extend(delta_rows);

            Ok(vec![Chunk::new(rows_to_batch(schema, &out_rows)?)])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    fn batch(ids: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(ids.to_vec()))]).unwrap()
    }

    #[tokio::test]
    async fn delta_rows_override_matching_primary_rows() {
        let mut inputs: std::collections::HashMap<String, ChunkStream> = std::collections::HashMap::new();
        inputs.insert("p".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(batch(&[1, 2, 3])))])));
        inputs.insert("d".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(batch(&[2])))])));

        let config = serde_json::json!({ "primary_node": "p", "delta_node": "d", "on": "id" });
        let out = MergeOperator.transform_multi(inputs, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let ids = chunks[0].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values(), &[1, 3, 2]);
    }
}
