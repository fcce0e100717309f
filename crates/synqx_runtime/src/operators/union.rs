//! `union`: streams each parent's chunks sequentially; the
//! output schema is the set-union of every parent's columns, with missing
//! columns filled as null on the parents that lack them.

use std::collections::HashMap;

use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorResult};
use crate::operators::util::{batch_to_rows, rows_to_batch, union_schema};

pub struct UnionOperator;

impl Operator for UnionOperator {
    fn name(&self) -> &'static str {
        "union"
    }

    fn validate_config(&self, _config: &Value) -> OperatorResult<()> {
        Ok(())
    }

    fn transform_multi(&self, inputs: HashMap<String, ChunkStream>, _config: &Value) -> OperatorResult<ChunkStream> {
        use futures::stream::{self, StreamExt};

        let fut = async move {
            let named = crate::operators::util::collect_named(inputs).await?;
            let mut parent_names: Vec<&String> = named.keys().collect();
            parent_names.sort();

            let mut schema: Option<arrow::datatypes::SchemaRef> = None;
            for chunks in named.values() {
                for chunk in chunks {
                    schema = Some(match &schema {
                        Some(s) => union_schema(s.as_ref(), chunk.schema().as_ref()),
                        None => chunk.schema(),
                    });
                }
            }
            let Some(schema) = schema else {
                return Ok(Vec::<Chunk>::new());
            };

            let mut out = Vec::new();
            for name in parent_names {
                for chunk in &named[name] {
                    let rows = batch_to_rows(chunk.record_batch());
                    out.push(Chunk::new(rows_to_batch(schema.clone(), &rows)?));
                }
            }
            Ok(out)
        };

        Ok(Box::pin(
            stream::once(fut).flat_map(|res: OperatorResult<Vec<Chunk>>| match res {
                Ok(chunks) => stream::iter(chunks.into_iter().map(Ok)).left_stream(),
                Err(e) => stream::iter(vec![Err(e)]).right_stream(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    #[tokio::test]
    async fn unions_schemas_with_null_fill_for_missing_columns() {
        let left_schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let left_batch = RecordBatch::try_new(left_schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        let right_schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("category", DataType::Utf8, true),
        ]));
        let right_batch = RecordBatch::try_new(
            right_schema,
            vec![Arc::new(Int64Array::from(vec![2])), Arc::new(StringArray::from(vec!["x"]))],
        )
        .unwrap();

        let mut inputs: HashMap<String, ChunkStream> = HashMap::new();
        inputs.insert("left".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(left_batch))])));
        inputs.insert("right".to_string(), Box::pin(stream::iter(vec![Ok(Chunk::new(right_batch))])));

        let out = UnionOperator.transform_multi(inputs, &Value::Null).unwrap();
        let chunks: Vec<_> = out.collect().await;
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            assert_eq!(c.as_ref().unwrap().schema().fields().len(), 2);
        }
    }
}
