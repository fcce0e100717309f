//! `drop_columns`: a singly-scoped `map` that removes a named set of
//! columns, keeping everything else in its original order.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::{parse_config, project};
use crate::operators::util::stream_map;

#[derive(Debug, Deserialize)]
struct DropConfig {
    columns: Vec<String>,
}

pub struct DropColumnsOperator;

fn remaining_mapping(schema: &arrow::datatypes::Schema, drop: &HashSet<String>) -> Vec<(String, String)> {
    schema
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| !drop.contains(name))
        .map(|name| (name.clone(), name))
        .collect()
}

impl Operator for DropColumnsOperator {
    fn name(&self) -> &'static str {
        "drop_columns"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: DropConfig = parse_config(self.name(), config)?;
        if cfg.columns.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "columns must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: DropConfig = parse_config(self.name(), config)?;
        let drop: HashSet<String> = cfg.columns.into_iter().collect();
        Ok(stream_map(input, move |chunk: Chunk| {
            let mapping = remaining_mapping(&chunk.schema(), &drop);
            project(&chunk, &mapping)
        }))
    }

    fn lineage_map(&self, input_columns: &[String], config: &Value) -> HashMap<String, HashSet<String>> {
        let drop: HashSet<String> = match parse_config::<DropConfig>(self.name(), config) {
            Ok(cfg) => cfg.columns.into_iter().collect(),
            Err(_) => return HashMap::new(),
        };
        input_columns
            .iter()
            .filter(|c| !drop.contains(*c))
            .map(|c| (c.clone(), HashSet::from([c.clone()])))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    #[tokio::test]
    async fn drops_the_listed_columns_only() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("internal_flag", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![1])), Arc::new(Int64Array::from(vec![0]))],
        )
        .unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));
        let config = serde_json::json!({ "columns": ["internal_flag"] });
        let out = DropColumnsOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let schema = chunks[0].as_ref().unwrap().schema();
        assert_eq!(schema.fields().len(), 1);
        assert_eq!(schema.field(0).name(), "id");
    }
}
