//! Layered DAG pipeline executor and the `synqx-agent`
//! binary that hosts it. An agent is a single-process worker: it leases a
//! job from the control plane, resolves a `PipelinePlan`, runs it through
//! [`Executor::run`], and reports a [`PipelineRunOutcome`] back.

pub mod bridge;
pub mod context;
pub mod error;
pub mod executor;
pub mod guardrail;
pub mod outcome;
pub mod quarantine;
pub mod retry;

pub use context::RunContext;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::Executor;
pub use outcome::PipelineRunOutcome;
