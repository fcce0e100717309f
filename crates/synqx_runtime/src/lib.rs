//! Chunk-based streaming operator runtime (spec component C3).
//!
//! A pipeline node becomes an [`operator::Operator`] driven by the
//! executor (`synqx_executor`, not this crate) over [`chunk::Chunk`]
//! streams. This crate owns the operator trait, the built-in operator
//! classes, and column-level lineage composition; it knows nothing about
//! DAG scheduling, retries, or connectors.

pub mod chunk;
pub mod lineage;
pub mod operator;
pub mod operators;

pub use chunk::Chunk;
pub use operator::{ChunkEvent, ChunkStream, OnChunk, Operator, OperatorError, OperatorRegistry, OperatorResult};
