//! `rename_columns`: a singly-scoped `map` that only renames, keeping
//! every other column as-is and in place.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::{parse_config, project};
use crate::operators::util::stream_map;

#[derive(Debug, Deserialize)]
struct RenameConfig {
    /// `old_name -> new_name`. Unlisted columns pass through untouched.
    renames: HashMap<String, String>,
}

pub struct RenameColumnsOperator;

fn full_mapping(schema: &arrow::datatypes::Schema, renames: &HashMap<String, String>) -> Vec<(String, String)> {
    schema
        .fields()
        .iter()
        .map(|f| {
            let name = f.name();
            (name.clone(), renames.get(name).cloned().unwrap_or_else(|| name.clone()))
        })
        .collect()
}

impl Operator for RenameColumnsOperator {
    fn name(&self) -> &'static str {
        "rename_columns"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: RenameConfig = parse_config(self.name(), config)?;
        if cfg.renames.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "renames must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: RenameConfig = parse_config(self.name(), config)?;
        Ok(stream_map(input, move |chunk: Chunk| {
            let mapping = full_mapping(&chunk.schema(), &cfg.renames);
            project(&chunk, &mapping)
        }))
    }

    fn lineage_map(&self, input_columns: &[String], config: &Value) -> HashMap<String, HashSet<String>> {
        let renames: HashMap<String, String> = match parse_config::<RenameConfig>(self.name(), config) {
            Ok(cfg) => cfg.renames,
            Err(_) => return HashMap::new(),
        };
        input_columns
            .iter()
            .map(|c| {
                let out = renames.get(c).cloned().unwrap_or_else(|| c.clone());
                (out, HashSet::from([c.clone()]))
            })
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
    async fn renames_only_the_listed_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("amount", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![1])), Arc::new(Int64Array::from(vec![10]))],
        )
        .unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));
        let config = serde_json::json!({ "renames": { "amount": "total" } });
        let out = RenameColumnsOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let schema = chunks[0].as_ref().unwrap().schema();
        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(1).name(), "total");
    }
}
