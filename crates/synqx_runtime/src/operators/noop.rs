//! `noop` / `pass_through`: forwards chunks unchanged. Useful as a
//! plan-building placeholder and as the operator a collapsed node's
//! neighbours see if a pushdown step still wants a graph slot to hang
//! lineage metadata on.

use crate::operator::{ChunkStream, Operator, OperatorResult};
use crate::operators::util::stream_map;

pub struct NoopOperator;

impl Operator for NoopOperator {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn validate_config(&self, _config: &serde_json::Value) -> OperatorResult<()> {
        Ok(())
    }

    fn transform(&self, input: ChunkStream, _config: &serde_json::Value) -> OperatorResult<ChunkStream> {
        Ok(stream_map(input, Ok))
    }
}

pub struct PassThroughOperator;

impl Operator for PassThroughOperator {
    fn name(&self) -> &'static str {
        "pass_through"
    }

    fn validate_config(&self, _config: &serde_json::Value) -> OperatorResult<()> {
        Ok(())
    }

    fn transform(&self, input: ChunkStream, _config: &serde_json::Value) -> OperatorResult<ChunkStream> {
        Ok(stream_map(input, Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use arrow::array::{Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    fn sample_chunk() -> Chunk {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        Chunk::new(RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap())
    }

    #[tokio::test]
    async fn noop_forwards_chunks_unchanged() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(sample_chunk())]));
        let out = NoopOperator.transform(input, &serde_json::Value::Null).unwrap();
        let chunks: Vec<_> = out.collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().num_rows(), 2);
    }
}
