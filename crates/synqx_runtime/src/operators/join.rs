//! `join`: two named parents, `left` and `right`. `right` is
//! materialized fully (it may be a lazy frame upstream, but this runtime
//! only deals in realized chunk streams); `left` is streamed chunk-by-chunk
//! against the materialized `right` index. Column name collisions on the
//! non-join-key side are suffixed `_right`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;

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

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum JoinHow {
    Left,
    Inner,
    #[serde(alias = "full")]
    Outer,
    Cross,
    Semi,
    Anti,
}

#[derive(Debug, Deserialize)]
struct JoinConfig {
    left_node: String,
    right_node: String,
    on: OnSpec,
    how: JoinHow,
}

fn key(row: &Map<String, Value>, cols: &[String]) -> String {
    let values: Vec<Value> = cols.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
    serde_json::to_string(&values).expect("Value serialization never fails")
}

fn combine(left: &Map<String, Value>, right: Option<&Map<String, Value>>, on: &[String]) -> Map<String, Value> {
    let mut out = left.clone();
    if let Some(right) = right {
        for (k, v) in right {
            if on.contains(k) {
                continue; // join keys already present from the left side
            }
            let name = if out.contains_key(k) { format!("{k}_right") } else { k.clone() };
            out.insert(name, v.clone());
        }
    }
    out
}

pub struct JoinOperator;

impl Operator for JoinOperator {
    fn name(&self) -> &'static str {
        "join"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        parse_config::<JoinConfig>(self.name(), config).map(|_| ())
    }

    fn transform_multi(&self, inputs: HashMap<String, ChunkStream>, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: JoinConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let on = cfg.on.columns();

        Ok(crate::operators::util::multi_blocking(inputs, move |mut named| {
            let left_chunks = named.remove(&cfg.left_node).ok_or_else(|| OperatorError::InvalidConfig {
                operator: "join".to_string(),
                reason: format!("missing left parent '{}'", cfg.left_node),
            })?;
            let right_chunks = named.remove(&cfg.right_node).ok_or_else(|| OperatorError::InvalidConfig {
                operator: "join".to_string(),
                reason: format!("missing right parent '{}'", cfg.right_node),
            })?;

            let mut right_rows: Vec<Map<String, Value>> = Vec::new();
            for chunk in &right_chunks {
                right_rows.extend(crate::operators::util::batch_to_rows(chunk.record_batch()));
            }
            let mut right_index: HashMap<String, Vec<usize>> = HashMap::new();
            if !matches!(cfg.how, JoinHow::Cross) {
                for (i, row) in right_rows.iter().enumerate() {
                    right_index.entry(key(row, &on)).or_default().push(i);
                }
            }

            let schema = if let Some(first) = left_chunks.first() {
                first.schema()
            } else {
                return Ok(vec![]);
            };
            let mut out_rows: Vec<Map<String, Value>> = Vec::new();

            for chunk in &left_chunks {
                for left_row in crate::operators::util::batch_to_rows(chunk.record_batch()) {
                    match cfg.how {
                        JoinHow::Cross => {
                            for right_row in &right_rows {
                                out_rows.push(combine(&left_row, Some(right_row), &on));
                            }
                        }
                        JoinHow::Semi => {
                            if right_index.contains_key(&key(&left_row, &on)) {
                                out_rows.push(left_row);
                            }
                        }
                        JoinHow::Anti => {
                            if !right_index.contains_key(&key(&left_row, &on)) {
                                out_rows.push(left_row);
                            }
                        }
                        JoinHow::Left | JoinHow::Inner | JoinHow::Outer => {
                            let matches = right_index.get(&key(&left_row, &on));
                            match matches {
                                Some(idxs) => {
                                    for &i in idxs {
                                        out_rows.push(combine(&left_row, Some(&right_rows[i]), &on));
                                    }
                                }
                                None => {
                                    if matches!(cfg.how, JoinHow::Left | JoinHow::Outer) {
                                        out_rows.push(combine(&left_row, None, &on));
                                    }
                                }
                            }
                        }
                    }
                }
            }

            if matches!(cfg.how, JoinHow::Outer) {
                let left_keys: std::collections::HashSet<String> = left_chunks
                    .iter()
                    .flat_map(|c| crate::operators::util::batch_to_rows(c.record_batch()))
                    .map(|r| key(&r, &on))
                    .collect();
                for (rkey, idxs) in &right_index {
                    if !left_keys.contains(rkey) {
                        for &i in idxs {
                            let mut row = Map::new();
                            for col in &on {
                                row.insert(col.clone(), right_rows[i].get(col).cloned().unwrap_or(Value::Null));
                            }
                            out_rows.push(combine(&row, Some(&right_rows[i]), &on));
                        }
                    }
                }
            }

            let out_schema = infer_join_schema(&out_rows, &schema);
            Ok(vec![Chunk::new(crate::operators::util::rows_to_batch(out_schema, &out_rows)?)])
        }))
    }
}

fn infer_join_schema(rows: &[Map<String, Value>], left_schema: &arrow::datatypes::SchemaRef) -> arrow::datatypes::SchemaRef {
    use arrow::datatypes::{DataType, Field, Schema};
    let mut fields: Vec<Field> = left_schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let known: std::collections::HashSet<String> = fields.iter().map(|f| f.name().clone()).collect();
    if let Some(first) = rows.first() {
        for (name, value) in first {
            if known.contains(name) {
                continue;
            }
            let dt = match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
                Value::Number(_) => DataType::Float64,
                Value::Bool(_) => DataType::Boolean,
                _ => DataType::Utf8,
            };
            fields.push(Field::new(name, dt, true));
        }
    }
    std::sync::Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    fn left_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("amount", DataType::Int64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![1, 2])), Arc::new(Int64Array::from(vec![10, 20]))],
        )
        .unwrap()
    }

    fn right_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("category", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![1])), Arc::new(StringArray::from(vec!["a"]))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn left_join_keeps_unmatched_rows_with_nulls() {
        let mut inputs: HashMap<String, ChunkStream> = HashMap::new();
        inputs.insert("l".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(left_batch()))])));
        inputs.insert("r".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(right_batch()))])));

        let config = serde_json::json!({ "left_node": "l", "right_node": "r", "on": "id", "how": "left" });
        let out = JoinOperator.transform_multi(inputs, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        assert_eq!(chunks[0].as_ref().unwrap().num_rows(), 2);
    }

    #[tokio::test]
    async fn inner_join_drops_unmatched_rows() {
        let mut inputs: HashMap<String, ChunkStream> = HashMap::new();
        inputs.insert("l".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(left_batch()))])));
        inputs.insert("r".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(right_batch()))])));

        let config = serde_json::json!({ "left_node": "l", "right_node": "r", "on": "id", "how": "inner" });
        let out = JoinOperator.transform_multi(inputs, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        assert_eq!(chunks[0].as_ref().unwrap().num_rows(), 1);
    }
}
