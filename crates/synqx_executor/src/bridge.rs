//! Row-major JSON ⇄ Arrow `Chunk` bridge at the EXTRACT/LOAD boundary.
//! Connectors speak `RowBatch` (plain JSON rows); the operator runtime
//! speaks `Chunk` (Arrow `RecordBatch`). Everything in between stays in
//! Arrow form, the same row-major/Arrow split `synqx_runtime::operators`
//! already draws for row-oriented operators.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde_json::Value;

use synqx_connectors::RowBatch;
use synqx_runtime::operator::{OperatorError, OperatorResult};
use synqx_runtime::operators::util::batch_to_rows;
use synqx_runtime::Chunk;

/// Widens a running [`DataType`] guess as a new value is observed,
/// preferring the more permissive type rather than erroring on a mixed
/// column — connectors hand back untyped JSON, so this is the same
/// best-effort inference `operators::code` applies to computed columns.
fn widen(current: Option<DataType>, value: &Value) -> Option<DataType> {
    let observed = match value {
        Value::Null => return current,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
        Value::Number(_) => DataType::Float64,
        _ => DataType::Utf8,
    };
    match current {
        None => Some(observed),
        Some(existing) if existing == observed => Some(existing),
        Some(DataType::Int64) if observed == DataType::Float64 => Some(DataType::Float64),
        Some(DataType::Float64) if observed == DataType::Int64 => Some(DataType::Float64),
        Some(_) => Some(DataType::Utf8),
    }
}

fn infer_schema(rows: &RowBatch) -> SchemaRef {
    let mut order: Vec<String> = Vec::new();
    let mut types: std::collections::HashMap<String, Option<DataType>> = std::collections::HashMap::new();
    for row in rows {
        for (key, value) in row {
            let entry = types.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                None
            });
            *entry = widen(entry.take(), value);
        }
    }
    let fields = order
        .into_iter()
        .map(|name| {
            let dt = types.get(&name).cloned().flatten().unwrap_or(DataType::Utf8);
            Field::new(name, dt, true)
        })
        .collect::<Vec<_>>();
    Arc::new(Schema::new(fields))
}

/// Converts a connector's row batch into a `Chunk`, inferring a schema from
/// the observed values. An empty `rows` still produces a valid empty
/// `Chunk` with an empty schema, matching the runtime's "empty chunks are
/// always forwarded" contract.
pub fn rows_to_chunk(rows: &RowBatch) -> OperatorResult<Chunk> {
    let schema = infer_schema(rows);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let values: Vec<&Value> = rows.iter().map(|r| r.get(field.name()).unwrap_or(&Value::Null)).collect();
        columns.push(build_column(field.data_type(), &values)?);
    }
    let batch = RecordBatch::try_new(schema, columns).map_err(OperatorError::from)?;
    Ok(Chunk::new(batch))
}

fn build_column(data_type: &DataType, values: &[&Value]) -> OperatorResult<ArrayRef> {
    Ok(match data_type {
        DataType::Boolean => Arc::new(BooleanArray::from(values.iter().map(|v| v.as_bool()).collect::<Vec<_>>())),
        DataType::Int64 => Arc::new(Int64Array::from(values.iter().map(|v| v.as_i64()).collect::<Vec<_>>())),
        DataType::Float64 => Arc::new(Float64Array::from(values.iter().map(|v| v.as_f64()).collect::<Vec<_>>())),
        _ => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    })
}

/// Converts an operator output `Chunk` back into connector-shaped rows for
/// a LOAD node's `write_batch`/`write_staged` call.
pub fn chunk_to_rows(chunk: &Chunk) -> RowBatch {
    batch_to_rows(chunk.record_batch())
}
