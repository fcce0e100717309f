//! The unit of data that flows along a pipeline's edges.

use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;

/// An opaque, cheaply-cloneable columnar batch. Wrapping `Arc<RecordBatch>`
/// rather than exposing Arrow types directly keeps the operator trait's
/// public surface stable even if the backing columnar library changes.
///
/// Empty chunks are valid and meaningful: they carry schema and function as
/// a heartbeat on an otherwise-idle edge, so operators must always forward
/// them rather than filtering them out as a micro-optimization.
#[derive(Debug, Clone)]
pub struct Chunk {
    batch: Arc<RecordBatch>,
}

impl Chunk {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch: Arc::new(batch) }
    }

    pub fn from_arc(batch: Arc<RecordBatch>) -> Self {
        Self { batch }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Approximate in-memory size, used for guardrail checks and
    /// telemetry; not a wire-serialized size.
    pub fn byte_size(&self) -> usize {
        self.batch.get_array_memory_size()
    }

    pub fn into_record_batch(self) -> Arc<RecordBatch> {
        self.batch
    }

    /// An empty chunk carrying the same schema, used when an operator
    /// needs to emit a heartbeat without any rows (e.g. every row in an
    /// input chunk got filtered out).
    pub fn empty_like(&self) -> Self {
        Self {
            batch: Arc::new(RecordBatch::new_empty(self.batch.schema())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap()
    }

    #[test]
    fn empty_like_preserves_schema_with_zero_rows() {
        let chunk = Chunk::new(sample_batch());
        let empty = chunk.empty_like();
        assert_eq!(empty.num_rows(), 0);
        assert!(empty.is_empty());
        assert_eq!(empty.schema(), chunk.schema());
    }

    #[test]
    fn clone_is_cheap_and_shares_the_same_batch() {
        let chunk = Chunk::new(sample_batch());
        let cloned = chunk.clone();
        assert_eq!(Arc::strong_count(&chunk.batch), 2);
        assert_eq!(cloned.num_rows(), 3);
    }
}
