//! `map`: projects the input schema down to an explicit, optionally
//! reordered, subset of columns. Unlike `rename_columns`/`drop_columns`
//! this is the general form — it can do both at once via `{input: output}`
//! naming pairs.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::util::stream_map;

#[derive(Debug, Deserialize)]
struct MapConfig {
    /// Ordered list of `(source_column, output_column)` pairs. Output
    /// order follows this list, not the input schema's order.
    columns: Vec<(String, String)>,
}

pub struct MapOperator;

impl Operator for MapOperator {
    fn name(&self) -> &'static str {
        "map"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: MapConfig = parse_config(self.name(), config)?;
        if cfg.columns.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "columns must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: MapConfig = parse_config(self.name(), config)?;
        Ok(stream_map(input, move |chunk: Chunk| project(&chunk, &cfg.columns)))
    }

    fn lineage_map(&self, _input_columns: &[String], config: &Value) -> HashMap<String, HashSet<String>> {
        match parse_config(self.name(), config) {
            Ok(cfg) => cfg
                .columns
                .into_iter()
                .map(|(src, out)| (out, HashSet::from([src])))
                .collect(),
            Err(_) => HashMap::new(),
        }
    }
}

pub(crate) fn parse_config<T: for<'de> serde::Deserialize<'de>>(operator: &str, config: &Value) -> OperatorResult<T> {
    serde_json::from_value(config.clone()).map_err(|e| OperatorError::InvalidConfig {
        operator: operator.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn project(chunk: &Chunk, columns: &[(String, String)]) -> OperatorResult<Chunk> {
    let batch = chunk.record_batch();
    let schema = batch.schema();
    let mut indices = Vec::with_capacity(columns.len());
    let mut fields = Vec::with_capacity(columns.len());
    for (src, out) in columns {
        let idx = schema.index_of(src).map_err(|_| OperatorError::InvalidConfig {
            operator: "map".to_string(),
            reason: format!("unknown source column '{src}'"),
        })?;
        indices.push(idx);
        let field = schema.field(idx).clone().with_name(out);
        fields.push(field);
    }
    let projected = batch.project(&indices)?;
    let new_schema = std::sync::Arc::new(arrow::datatypes::Schema::new(fields));
    let renamed = arrow::record_batch::RecordBatch::try_new(new_schema, projected.columns().to_vec())?;
    Ok(Chunk::new(renamed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    fn sample_chunk() -> Chunk {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        Chunk::new(
            RecordBatch::try_new(
                schema,
                vec![Arc::new(Int64Array::from(vec![1, 2])), Arc::new(StringArray::from(vec!["a", "b"]))],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn map_renames_and_reorders_columns() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(sample_chunk())]));
        let config = serde_json::json!({ "columns": [["name", "user_name"], ["id", "user_id"]] });
        let out = MapOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let chunk = chunks[0].as_ref().unwrap();
        let schema = chunk.schema();
        assert_eq!(schema.field(0).name(), "user_name");
        assert_eq!(schema.field(1).name(), "user_id");
    }

    #[test]
    fn lineage_map_traces_output_to_source_column() {
        let config = serde_json::json!({ "columns": [["name", "user_name"]] });
        let lineage = MapOperator.lineage_map(&[], &config);
        assert_eq!(lineage["user_name"], HashSet::from(["name".to_string()]));
    }
}
