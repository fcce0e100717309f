//! `deduplicate` (blocking): accumulates the full input and
//! returns rows unique by an optional `subset` of columns, keeping either
//! the `first` or `last` occurrence and preserving original row order.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, blocking, concat_chunks, rows_to_batch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum Keep {
    #[default]
    First,
    Last,
}

#[derive(Debug, Deserialize, Default)]
struct DedupeConfig {
    #[serde(default)]
    subset: Option<Vec<String>>,
    #[serde(default)]
    keep: Keep,
}

/// `Value` has no `Hash` impl (its `Number` variant can hold floats), so the
/// dedupe key is the canonical JSON string of the selected columns rather
/// than the raw values.
fn dedupe_key(row: &Map<String, Value>, subset: &Option<Vec<String>>) -> String {
    let values: Vec<Value> = match subset {
        Some(cols) => cols.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect(),
        None => {
            let mut keys: Vec<&String> = row.keys().collect();
            keys.sort();
            keys.into_iter().map(|k| row[k].clone()).collect()
        }
    };
    serde_json::to_string(&values).expect("Value serialization never fails")
}

fn dedupe_rows(rows: Vec<Map<String, Value>>, cfg: &DedupeConfig) -> Vec<Map<String, Value>> {
    use std::collections::HashMap;
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut keep_index: Vec<usize> = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let key = dedupe_key(row, &cfg.subset);
        match cfg.keep {
            Keep::First => {
                if !first_seen.contains_key(&key) {
                    first_seen.insert(key, keep_index.len());
                    keep_index.push(i);
                }
            }
            Keep::Last => {
                if let Some(&slot) = first_seen.get(&key) {
                    keep_index[slot] = i;
                } else {
                    first_seen.insert(key, keep_index.len());
                    keep_index.push(i);
                }
            }
        }
    }
    keep_index.into_iter().map(|i| rows[i].clone()).collect()
}

pub struct DeduplicateOperator;

impl Operator for DeduplicateOperator {
    fn name(&self) -> &'static str {
        "deduplicate"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        parse_config::<DedupeConfig>(self.name(), config).map(|_| ())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: DedupeConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(blocking(input, move |chunks| {
            let Some(combined) = concat_chunks(&chunks)? else {
                return Ok(vec![]);
            };
            let schema = combined.schema();
            let rows = batch_to_rows(&combined);
            let deduped = dedupe_rows(rows, &cfg);
            Ok(vec![Chunk::new(rows_to_batch(schema, &deduped)?)])
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
    async fn keeps_first_occurrence_by_default() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch(&[1, 2, 1, 3])))]));
        let config = serde_json::json!({ "subset": ["id"] });
        let out = DeduplicateOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let ids = chunks[0].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn keep_last_retains_the_final_occurrence_position() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch(&[1, 2, 1])))]));
        let config = serde_json::json!({ "subset": ["id"], "keep": "last" });
        let out = DeduplicateOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let ids = chunks[0].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values(), &[2, 1]);
    }
}
