//! `aggregate` (blocking): groups the full input by
//! `group_by` and applies a `col -> {sum, mean/avg, count, min, max,
//! unique_count}` mapping per output column.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, blocking, concat_chunks, rows_to_batch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AggFn {
    Sum,
    Mean,
    Avg,
    Count,
    Min,
    Max,
    UniqueCount,
}

#[derive(Debug, Deserialize)]
struct AggregateConfig {
    group_by: Vec<String>,
    #[serde(rename = "aggregate", alias = "aggregations")]
    aggregations: HashMap<String, AggFn>,
}

fn group_key(row: &Map<String, Value>, group_by: &[String]) -> String {
    let values: Vec<Value> = group_by.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect();
    serde_json::to_string(&values).expect("Value serialization never fails")
}

fn apply_agg(values: &[&Value], kind: AggFn) -> Value {
    match kind {
        AggFn::Count => Value::from(values.len() as i64),
        AggFn::UniqueCount => {
            let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
            for v in values {
                seen.insert(serde_json::to_string(v).unwrap_or_default());
            }
            Value::from(seen.len() as i64)
        }
        AggFn::Sum | AggFn::Mean | AggFn::Avg | AggFn::Min | AggFn::Max => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            match kind {
                AggFn::Sum => Value::from(numbers.iter().sum::<f64>()),
                AggFn::Mean | AggFn::Avg => Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64),
                AggFn::Min => Value::from(numbers.iter().cloned().fold(f64::INFINITY, f64::min)),
                AggFn::Max => Value::from(numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
                _ => unreachable!(),
            }
        }
    }
}

pub struct AggregateOperator;

impl Operator for AggregateOperator {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: AggregateConfig = parse_config(self.name(), config)?;
        if cfg.group_by.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "group_by must not be empty".to_string(),
            });
        }
        if cfg.aggregations.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "aggregate mapping must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: AggregateConfig = parse_config(self.name(), config)?;
        Ok(blocking(input, move |chunks| {
            let Some(combined) = concat_chunks(&chunks)? else {
                return Ok(vec![]);
            };
            let rows = batch_to_rows(&combined);

            let mut groups: Vec<(String, Map<String, Value>)> = Vec::new();
            let mut group_rows: HashMap<String, Vec<usize>> = HashMap::new();
            for (i, row) in rows.iter().enumerate() {
                let key = group_key(row, &cfg.group_by);
                group_rows.entry(key.clone()).or_insert_with(|| {
                    groups.push((key.clone(), row.clone()));
                    Vec::new()
                });
                group_rows.get_mut(&key).unwrap().push(i);
            }

            let mut out_rows = Vec::with_capacity(groups.len());
            for (key, sample_row) in &groups {
                let member_indices = &group_rows[key];
                let mut out_row = Map::new();
                for col in &cfg.group_by {
                    out_row.insert(col.clone(), sample_row.get(col).cloned().unwrap_or(Value::Null));
                }
                for (col, agg_fn) in &cfg.aggregations {
                    let values: Vec<&Value> = member_indices.iter().map(|&i| rows[i].get(col).unwrap_or(&Value::Null)).collect();
                    let output_name = format!("{col}_{}", agg_name(*agg_fn));
                    out_row.insert(output_name, apply_agg(&values, *agg_fn));
                }
                out_rows.push(out_row);
            }

            let schema = infer_schema(&out_rows);
            Ok(vec![Chunk::new(rows_to_batch(schema, &out_rows)?)])
        }))
    }
}

fn agg_name(kind: AggFn) -> &'static str {
    match kind {
        AggFn::Sum => "sum",
        AggFn::Mean => "mean",
        AggFn::Avg => "avg",
        AggFn::Count => "count",
        AggFn::Min => "min",
        AggFn::Max => "max",
        AggFn::UniqueCount => "unique_count",
    }
}

/// Aggregate output columns are all either the group-by key (preserving its
/// native type is unnecessary here — group keys are stringly-compared
/// already) or a numeric statistic, so the output schema is always
/// `Utf8`-for-group-columns, `Int64`-for-count-like, `Float64` for
/// everything else. Good enough for the columnar round-trip this operator
/// needs; a caller that needs the group column's original type back should
/// `type_cast` downstream.
fn infer_schema(rows: &[Map<String, Value>]) -> arrow::datatypes::SchemaRef {
    use arrow::datatypes::{DataType, Field, Schema};
    let mut fields = Vec::new();
    if let Some(first) = rows.first() {
        for (name, value) in first {
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
    use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    #[tokio::test]
    async fn groups_and_sums() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("category", DataType::Utf8, false),
            Field::new("amount", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "a", "b"])),
                Arc::new(Float64Array::from(vec![10.0, 20.0, 5.0])),
            ],
        )
        .unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));
        let config = serde_json::json!({ "group_by": ["category"], "aggregate": { "amount": "sum" } });
        let out = AggregateOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let result = chunks[0].as_ref().unwrap();
        assert_eq!(result.num_rows(), 2);
        let sum_idx = result.schema().index_of("amount_sum").unwrap();
        let sums = result.record_batch().column(sum_idx).as_any().downcast_ref::<Float64Array>().unwrap();
        let total: f64 = sums.values().iter().sum();
        assert_eq!(total, 35.0);
    }

    #[tokio::test]
    async fn count_produces_integer_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("category", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["a", "a"]))]).unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));
        let config = serde_json::json!({ "group_by": ["category"], "aggregate": { "category": "count" } });
        let out = AggregateOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let result = chunks[0].as_ref().unwrap();
        let count_idx = result.schema().index_of("category_count").unwrap();
        let counts = result.record_batch().column(count_idx).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(counts.value(0), 2);
    }
}
