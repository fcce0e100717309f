//! `type_cast`: casts a named subset of columns to a different Arrow
//! type, leaving everything else alone. Backed directly by
//! `arrow::compute::cast`, so it only supports conversions Arrow itself
//! considers lossless-or-truncating-with-intent (e.g. float->int truncates,
//! string->int fails on non-numeric text row-by-row as a cast error, which
//! surfaces as an operator error rather than a quarantined row — pair with
//! `validate` upstream if partial failures should be quarantined instead).

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::stream_map;

#[derive(Debug, Deserialize)]
struct TypeCastConfig {
    /// `column -> target type`, using the same type names as
    /// `SchemaColumnSpec` (`int64`, `float64`, `utf8`, `boolean`, `date32`,
    /// `timestamp_us`).
    casts: HashMap<String, String>,
}

fn parse_type_name(name: &str) -> OperatorResult<DataType> {
    match name {
        "int64" => Ok(DataType::Int64),
        "float64" => Ok(DataType::Float64),
        "utf8" | "string" => Ok(DataType::Utf8),
        "boolean" | "bool" => Ok(DataType::Boolean),
        "date32" => Ok(DataType::Date32),
        "timestamp_us" => Ok(DataType::Timestamp(arrow::datatypes::TimeUnit::Microsecond, None)),
        other => Err(OperatorError::InvalidConfig {
            operator: "type_cast".to_string(),
            reason: format!("unknown target type '{other}'"),
        }),
    }
}

pub struct TypeCastOperator;

impl Operator for TypeCastOperator {
    fn name(&self) -> &'static str {
        "type_cast"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: TypeCastConfig = parse_config(self.name(), config)?;
        if cfg.casts.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "casts must not be empty".to_string(),
            });
        }
        for ty in cfg.casts.values() {
            parse_type_name(ty)?;
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: TypeCastConfig = parse_config(self.name(), config)?;
        let mut targets = HashMap::new();
        for (col, ty) in &cfg.casts {
            targets.insert(col.clone(), parse_type_name(ty)?);
        }

        Ok(stream_map(input, move |chunk: Chunk| {
            let batch = chunk.record_batch();
            let schema = batch.schema();
            let mut fields = Vec::with_capacity(schema.fields().len());
            let mut columns = Vec::with_capacity(schema.fields().len());
            for (i, field) in schema.fields().iter().enumerate() {
                let column = batch.column(i);
                if let Some(target) = targets.get(field.name()) {
                    let cast = arrow::compute::cast(column, target)?;
                    fields.push(Field::new(field.name(), target.clone(), field.is_nullable()));
                    columns.push(cast);
                } else {
                    fields.push(field.as_ref().clone());
                    columns.push(column.clone());
                }
            }
            let new_schema = Arc::new(Schema::new(fields));
            Ok(Chunk::new(RecordBatch::try_new(new_schema, columns)?))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};
    use futures::stream::{self, StreamExt};

    #[tokio::test]
    async fn casts_float_column_to_int64() {
        let schema = Arc::new(Schema::new(vec![Field::new("amount", DataType::Float64, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(vec![1.9, 2.1]))]).unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));
        let config = serde_json::json!({ "casts": { "amount": "int64" } });
        let out = TypeCastOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let chunk = chunks[0].as_ref().unwrap();
        assert_eq!(chunk.schema().field(0).data_type(), &DataType::Int64);
        let arr = chunk.record_batch().column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(arr.value(0), 1);
    }
}
