//! Helpers shared by several built-in operators: a streaming adapter for
//! single-chunk transforms, a blocking-to-EOS adapter for operators that
//! must see the whole input before emitting (`sort`,
//! `aggregate`, `deduplicate`, `merge`, `scd_type_2`), and a row-major JSON
//! bridge used by operators whose logic is naturally row-at-a-time
//! (join/merge/scd/aggregate/validate) rather than columnar.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Date32Array, Date32Builder, Float64Array,
    Float64Builder, Int64Array, Int64Builder, StringArray, StringBuilder,
    TimestampMicrosecondArray, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, OperatorError, OperatorResult};

/// Wraps a per-chunk closure into a `ChunkStream`, forwarding errors and
/// preserving chunk order (operators never reorder within one edge).
pub fn stream_map<F>(input: ChunkStream, mut f: F) -> ChunkStream
where
    F: FnMut(Chunk) -> OperatorResult<Chunk> + Send + 'static,
{
    Box::pin(input.map(move |res| res.and_then(&mut f)))
}

/// Runs `f` once the entire input stream has been collected, then emits
/// whatever chunks `f` produces. Used by blocking operators that must see
/// every row before they can emit anything (the operator's own streaming
/// `transform` wraps this).
pub fn blocking<F>(input: ChunkStream, f: F) -> ChunkStream
where
    F: FnOnce(Vec<Chunk>) -> OperatorResult<Vec<Chunk>> + Send + 'static,
{
    let fut = async move {
        let chunks: Vec<OperatorResult<Chunk>> = input.collect().await;
        let mut collected = Vec::with_capacity(chunks.len());
        for c in chunks {
            collected.push(c?);
        }
        f(collected)
    };
    Box::pin(
        stream::once(fut).flat_map(|res: OperatorResult<Vec<Chunk>>| match res {
            Ok(chunks) => stream::iter(chunks.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::iter(vec![Err(e)]).right_stream(),
        }),
    )
}

/// Same as [`blocking`] but for `transform_multi`: every named input is
/// fully materialized first. Keys preserve the caller's parent-node-id
/// naming.
pub async fn collect_named(
    mut inputs: std::collections::HashMap<String, ChunkStream>,
) -> OperatorResult<std::collections::HashMap<String, Vec<Chunk>>> {
    let mut out = std::collections::HashMap::new();
    for (name, stream) in inputs.drain() {
        let chunks: Vec<OperatorResult<Chunk>> = stream.collect().await;
        let mut collected = Vec::with_capacity(chunks.len());
        for c in chunks {
            collected.push(c?);
        }
        out.insert(name, collected);
    }
    Ok(out)
}

pub fn multi_blocking<F>(
    inputs: std::collections::HashMap<String, ChunkStream>,
    f: F,
) -> ChunkStream
where
    F: FnOnce(std::collections::HashMap<String, Vec<Chunk>>) -> OperatorResult<Vec<Chunk>> + Send + 'static,
{
    let fut = async move {
        let named = collect_named(inputs).await?;
        f(named)
    };
    Box::pin(
        stream::once(fut).flat_map(|res: OperatorResult<Vec<Chunk>>| match res {
            Ok(chunks) => stream::iter(chunks.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::iter(vec![Err(e)]).right_stream(),
        }),
    )
}

/// Concatenates a run of chunks that share a schema into one `RecordBatch`.
/// Empty input yields `None` (callers should fall back to an empty chunk
/// carrying whatever schema they already know about).
pub fn concat_chunks(chunks: &[Chunk]) -> OperatorResult<Option<RecordBatch>> {
    let batches: Vec<&RecordBatch> = chunks.iter().map(Chunk::record_batch).collect();
    if batches.is_empty() {
        return Ok(None);
    }
    let schema = batches[0].schema();
    let combined = arrow::compute::concat_batches(&schema, batches)?;
    Ok(Some(combined))
}

// ---------------------------------------------------------------------
// Row-major JSON bridge
// ---------------------------------------------------------------------

/// Converts one column to a `Vec<serde_json::Value>`, one entry per row.
/// Covers the scalar types `SchemaColumnSpec`/`type_cast` deal in;
/// anything else becomes `Value::Null` with the original
/// typed array left untouched (callers that need full fidelity should
/// operate on the typed array directly instead of going through JSON).
pub fn column_to_json(array: &ArrayRef) -> Vec<Value> {
    macro_rules! col {
        ($ty:ty, $conv:expr) => {{
            let arr = array.as_any().downcast_ref::<$ty>().expect("checked by data_type() match");
            (0..arr.len())
                .map(|i| if arr.is_null(i) { Value::Null } else { $conv(arr, i) })
                .collect()
        }};
    }
    match array.data_type() {
        DataType::Int64 => col!(Int64Array, |a: &Int64Array, i: usize| Value::from(a.value(i))),
        DataType::Float64 => col!(Float64Array, |a: &Float64Array, i: usize| {
            serde_json::Number::from_f64(a.value(i)).map(Value::Number).unwrap_or(Value::Null)
        }),
        DataType::Boolean => col!(BooleanArray, |a: &BooleanArray, i: usize| Value::from(a.value(i))),
        DataType::Utf8 => col!(StringArray, |a: &StringArray, i: usize| Value::from(a.value(i).to_string())),
        DataType::Date32 => col!(Date32Array, |a: &Date32Array, i: usize| Value::from(a.value(i))),
        DataType::Timestamp(arrow::datatypes::TimeUnit::Microsecond, _) => {
            col!(TimestampMicrosecondArray, |a: &TimestampMicrosecondArray, i: usize| Value::from(a.value(i)))
        }
        _ => vec![Value::Null; array.len()],
    }
}

/// Row-major view of a batch: one `Map` per row, keyed by column name.
pub fn batch_to_rows(batch: &RecordBatch) -> Vec<Map<String, Value>> {
    let schema = batch.schema();
    let columns: Vec<(String, Vec<Value>)> = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(f, c)| (f.name().clone(), column_to_json(c)))
        .collect();

    let mut rows = vec![Map::new(); batch.num_rows()];
    for (name, values) in columns {
        for (row, value) in rows.iter_mut().zip(values.into_iter()) {
            row.insert(name.clone(), value);
        }
    }
    rows
}

/// Rebuilds a `RecordBatch` from row-major JSON rows against `schema`,
/// the inverse of [`batch_to_rows`] restricted to the same scalar types.
pub fn rows_to_batch(schema: SchemaRef, rows: &[Map<String, Value>]) -> OperatorResult<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let name = field.name();
        let array: ArrayRef = match field.data_type() {
            DataType::Int64 => {
                let mut b = Int64Builder::new();
                for row in rows {
                    match row.get(name).and_then(Value::as_i64) {
                        Some(v) => b.append_value(v),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Float64 => {
                let mut b = Float64Builder::new();
                for row in rows {
                    match row.get(name).and_then(Value::as_f64) {
                        Some(v) => b.append_value(v),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Boolean => {
                let mut b = BooleanBuilder::new();
                for row in rows {
                    match row.get(name).and_then(Value::as_bool) {
                        Some(v) => b.append_value(v),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Utf8 => {
                let mut b = StringBuilder::new();
                for row in rows {
                    match row.get(name).and_then(Value::as_str) {
                        Some(v) => b.append_value(v),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Date32 => {
                let mut b = Date32Builder::new();
                for row in rows {
                    match row.get(name).and_then(Value::as_i64) {
                        Some(v) => b.append_value(v as i32),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Timestamp(arrow::datatypes::TimeUnit::Microsecond, tz) => {
                let mut b = TimestampMicrosecondBuilder::new();
                for row in rows {
                    match row.get(name).and_then(Value::as_i64) {
                        Some(v) => b.append_value(v),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.with_timezone_opt(tz.clone()).finish())
            }
            other => {
                return Err(OperatorError::Other(format!(
                    "rows_to_batch: unsupported column type {other:?} for '{name}'"
                )))
            }
        };
        columns.push(array);
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Builds the union of two schemas by field name: fields unique to either
/// side are kept, name collisions keep the left side's type. Used by
/// `union` (missing columns become null) and `join` (pre-suffix-collision
/// schema planning).
pub fn union_schema(left: &Schema, right: &Schema) -> SchemaRef {
    let mut fields = left.fields().iter().map(|f| f.as_ref().clone()).collect::<Vec<_>>();
    for rf in right.fields() {
        if !fields.iter().any(|f| f.name() == rf.name()) {
            fields.push(rf.as_ref().clone());
        }
    }
    Arc::new(Schema::new(fields))
}
