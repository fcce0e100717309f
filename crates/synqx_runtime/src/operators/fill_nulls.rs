//! `fill_nulls`: replaces null cells with either a fixed scalar or a
//! strategy-derived value. `forward`/`backward` carry state
//! across chunks within one run (streaming, last-value-wins); `min`/`max`/
//! `mean` need the whole column and therefore run as a two-pass blocking
//! operator like `aggregate`/`sort`; `zero`/`one` are stateless constants.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{blocking, column_to_json, concat_chunks, stream_map};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Strategy {
    Forward,
    Backward,
    Min,
    Max,
    Mean,
    Zero,
    One,
}

#[derive(Debug, Deserialize)]
struct FillNullsConfig {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    strategy: Option<Strategy>,
    #[serde(default)]
    subset: Option<Vec<String>>,
}

fn targets(schema: &arrow::datatypes::Schema, subset: &Option<Vec<String>>) -> Vec<String> {
    match subset {
        Some(cols) => cols.clone(),
        None => schema.fields().iter().map(|f| f.name().clone()).collect(),
    }
}

fn fill_with_scalar_numeric(array: &ArrayRef, scalar: f64) -> OperatorResult<ArrayRef> {
    match array.data_type() {
        DataType::Int64 => {
            let arr = array.as_any().downcast_ref::<Int64Array>().unwrap();
            let filled: Int64Array = arr.iter().map(|v| Some(v.unwrap_or(scalar as i64))).collect();
            Ok(Arc::new(filled))
        }
        DataType::Float64 => {
            let arr = array.as_any().downcast_ref::<Float64Array>().unwrap();
            let filled: Float64Array = arr.iter().map(|v| Some(v.unwrap_or(scalar))).collect();
            Ok(Arc::new(filled))
        }
        _ => Ok(array.clone()),
    }
}

fn fill_scalar_value(array: &ArrayRef, value: &Value) -> OperatorResult<ArrayRef> {
    match array.data_type() {
        DataType::Int64 => {
            let scalar = value.as_i64().ok_or_else(|| OperatorError::InvalidConfig {
                operator: "fill_nulls".to_string(),
                reason: "value is not an integer for an int64 column".to_string(),
            })?;
            fill_with_scalar_numeric(array, scalar as f64)
        }
        DataType::Float64 => {
            let scalar = value.as_f64().ok_or_else(|| OperatorError::InvalidConfig {
                operator: "fill_nulls".to_string(),
                reason: "value is not numeric for a float64 column".to_string(),
            })?;
            fill_with_scalar_numeric(array, scalar)
        }
        DataType::Utf8 => {
            let scalar = value.as_str().ok_or_else(|| OperatorError::InvalidConfig {
                operator: "fill_nulls".to_string(),
                reason: "value is not a string for a utf8 column".to_string(),
            })?;
            let arr = array.as_any().downcast_ref::<arrow::array::StringArray>().unwrap();
            let filled: arrow::array::StringArray =
                arr.iter().map(|v| Some(v.unwrap_or(scalar).to_string())).collect();
            Ok(Arc::new(filled))
        }
        DataType::Boolean => {
            let scalar = value.as_bool().ok_or_else(|| OperatorError::InvalidConfig {
                operator: "fill_nulls".to_string(),
                reason: "value is not a boolean for a boolean column".to_string(),
            })?;
            let arr = array.as_any().downcast_ref::<arrow::array::BooleanArray>().unwrap();
            let filled: arrow::array::BooleanArray = arr.iter().map(|v| Some(v.unwrap_or(scalar))).collect();
            Ok(Arc::new(filled))
        }
        other => Err(OperatorError::Other(format!("fill_nulls: unsupported column type {other:?}"))),
    }
}

fn map_target_columns(
    batch: &RecordBatch,
    cols: &HashSet<String>,
    mut f: impl FnMut(&ArrayRef, &str) -> OperatorResult<ArrayRef>,
) -> OperatorResult<RecordBatch> {
    let schema = batch.schema();
    let mut columns = batch.columns().to_vec();
    for (i, field) in schema.fields().iter().enumerate() {
        if cols.contains(field.name()) {
            columns[i] = f(&columns[i], field.name())?;
        }
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Forward/backward fill carries, per target column, the last non-null
/// scalar seen across chunk boundaries within one run. Backward fill only
/// needs within-chunk lookahead (it is defined relative to the *next* row
/// in the still-unseen-at-fill-time stream order), so it carries no
/// cross-chunk state.
struct ForwardState {
    last: Mutex<std::collections::HashMap<String, Value>>,
}

fn forward_fill_column(array: &ArrayRef, column: &str, state: &ForwardState) -> OperatorResult<ArrayRef> {
    let mut rows = column_to_json(array);
    let mut carry = state.last.lock().expect("fill_nulls forward-fill state poisoned");
    let mut prev = carry.get(column).cloned();
    for v in rows.iter_mut() {
        if v.is_null() {
            if let Some(p) = &prev {
                *v = p.clone();
            }
        } else {
            prev = Some(v.clone());
        }
    }
    if let Some(p) = prev {
        carry.insert(column.to_string(), p);
    }
    rebuild_column(array.data_type(), rows)
}

fn backward_fill_column(array: &ArrayRef) -> OperatorResult<ArrayRef> {
    let mut rows = column_to_json(array);
    let mut next: Option<Value> = None;
    for v in rows.iter_mut().rev() {
        if v.is_null() {
            if let Some(n) = &next {
                *v = n.clone();
            }
        } else {
            next = Some(v.clone());
        }
    }
    rebuild_column(array.data_type(), rows)
}

fn rebuild_column(data_type: &DataType, rows: Vec<Value>) -> OperatorResult<ArrayRef> {
    let schema = arrow::datatypes::Schema::new(vec![arrow::datatypes::Field::new("v", data_type.clone(), true)]);
    let rows_map: Vec<_> = rows
        .into_iter()
        .map(|v| serde_json::Map::from_iter([("v".to_string(), v)]))
        .collect();
    let batch = crate::operators::util::rows_to_batch(Arc::new(schema), &rows_map)?;
    Ok(batch.column(0).clone())
}

fn column_stat(array: &ArrayRef, strategy: Strategy) -> Option<f64> {
    let values: Vec<f64> = match array.data_type() {
        DataType::Int64 => array
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .iter()
            .flatten()
            .map(|v| v as f64)
            .collect(),
        DataType::Float64 => array.as_any().downcast_ref::<Float64Array>().unwrap().iter().flatten().collect(),
        _ => return None,
    };
    if values.is_empty() {
        return None;
    }
    Some(match strategy {
        Strategy::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        Strategy::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        Strategy::Mean => values.iter().sum::<f64>() / values.len() as f64,
        _ => unreachable!("column_stat only called for min/max/mean"),
    })
}

pub struct FillNullsOperator;

impl Operator for FillNullsOperator {
    fn name(&self) -> &'static str {
        "fill_nulls"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: FillNullsConfig = parse_config(self.name(), config)?;
        if cfg.value.is_none() && cfg.strategy.is_none() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "either `value` or `strategy` must be set".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: FillNullsConfig = parse_config(self.name(), config)?;

        if let Some(value) = cfg.value.clone() {
            return Ok(stream_map(input, move |chunk: Chunk| {
                let cols: HashSet<String> = targets(&chunk.schema(), &cfg.subset).into_iter().collect();
                let batch = map_target_columns(chunk.record_batch(), &cols, |a, _| fill_scalar_value(a, &value))?;
                Ok(Chunk::new(batch))
            }));
        }

        match cfg.strategy.expect("validated above") {
            Strategy::Zero => Ok(stream_map(input, move |chunk: Chunk| {
                let cols: HashSet<String> = targets(&chunk.schema(), &cfg.subset).into_iter().collect();
                let batch = map_target_columns(chunk.record_batch(), &cols, |a, _| fill_with_scalar_numeric(a, 0.0))?;
                Ok(Chunk::new(batch))
            })),
            Strategy::One => Ok(stream_map(input, move |chunk: Chunk| {
                let cols: HashSet<String> = targets(&chunk.schema(), &cfg.subset).into_iter().collect();
                let batch = map_target_columns(chunk.record_batch(), &cols, |a, _| fill_with_scalar_numeric(a, 1.0))?;
                Ok(Chunk::new(batch))
            })),
            Strategy::Forward => {
                let state = Arc::new(ForwardState { last: Mutex::new(std::collections::HashMap::new()) });
                Ok(stream_map(input, move |chunk: Chunk| {
                    let cols: HashSet<String> = targets(&chunk.schema(), &cfg.subset).into_iter().collect();
                    let batch = map_target_columns(chunk.record_batch(), &cols, |a, name| forward_fill_column(a, name, &state))?;
                    Ok(Chunk::new(batch))
                }))
            }
            Strategy::Backward => Ok(stream_map(input, move |chunk: Chunk| {
                let cols: HashSet<String> = targets(&chunk.schema(), &cfg.subset).into_iter().collect();
                let batch = map_target_columns(chunk.record_batch(), &cols, |a, _| backward_fill_column(a))?;
                Ok(Chunk::new(batch))
            })),
            strategy @ (Strategy::Min | Strategy::Max | Strategy::Mean) => {
                let cols_cfg = cfg.subset.clone();
                Ok(blocking(input, move |chunks| {
                    let Some(combined) = concat_chunks(&chunks)? else {
                        return Ok(vec![]);
                    };
                    let cols: HashSet<String> = targets(&combined.schema(), &cols_cfg).into_iter().collect();
                    let mut stats: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
                    for (i, field) in combined.schema().fields().iter().enumerate() {
                        if cols.contains(field.name()) {
                            if let Some(v) = column_stat(combined.column(i), strategy) {
                                stats.insert(field.name().clone(), v);
                            }
                        }
                    }
                    let filled = map_target_columns(&combined, &cols, |a, name| match stats.get(name) {
                        Some(stat) => fill_with_scalar_numeric(a, *stat),
                        None => Ok(a.clone()),
                    })?;
                    Ok(vec![Chunk::new(filled)])
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType as Dt, Field, Schema};
    use futures::stream::{self, StreamExt};

    #[tokio::test]
    async fn scalar_value_fills_nulls_in_int_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("amount", Dt::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![Some(1), None, Some(3)]))],
        )
        .unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));
        let config = serde_json::json!({ "value": 0 });
        let out = FillNullsOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let col = chunks[0].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(col.value(1), 0);
    }

    #[tokio::test]
    async fn mean_strategy_fills_with_whole_column_average() {
        let schema = Arc::new(Schema::new(vec![Field::new("amount", Dt::Float64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Float64Array::from(vec![Some(10.0), None, Some(20.0)]))],
        )
        .unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));
        let config = serde_json::json!({ "strategy": "mean" });
        let out = FillNullsOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let col = chunks[0].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(col.value(1), 15.0);
    }

    #[tokio::test]
    async fn forward_fill_carries_last_value_across_chunks() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", Dt::Int64, true)]));
        let batch1 = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(vec![Some(5), None]))]).unwrap();
        let batch2 = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![None, Some(9)]))]).unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch1)), Ok(Chunk::new(batch2))]));
        let config = serde_json::json!({ "strategy": "forward" });
        let out = FillNullsOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let second = chunks[1].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(second.value(0), 5);
        assert_eq!(second.value(1), 9);
    }
}
