//! Job control plane: pipeline/job storage, agent fleet registry, the
//! cron/SLA background ticks, ephemeral query handling, and GitOps YAML
//! import/export. Hosted by the `synqx-controld` binary; `synqx_executor`'s
//! agent binary is the client on the other side of the fleet.

pub mod agent_registry;
pub mod ephemeral;
pub mod error;
pub mod gitops;
pub mod job_store;
pub mod pipeline_store;
pub mod pubsub;
pub mod result_cache;
pub mod scheduler;
pub mod schema;

pub use agent_registry::AgentRegistry;
pub use error::{ControlError, ControlResult};
pub use ephemeral::EphemeralJobStore;
pub use job_store::JobStore;
pub use pipeline_store::PipelineStore;
pub use pubsub::{PubSub, Topic};
pub use result_cache::{ResultCache, ResultCacheKey};
pub use scheduler::Scheduler;
