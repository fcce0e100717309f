//! Default tunables, centralized so every crate agrees on the same
//! numbers without importing each other's config structs.

use std::time::Duration;

/// Agent heartbeat period (`H` in the fleet spec).
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// An agent whose last heartbeat is older than this is treated as OFFLINE
/// on read, regardless of its stored status column.
pub const AGENT_LIVENESS_WINDOW: Duration = Duration::from_secs(2 * 60);

/// Consecutive missed heartbeats before an agent self-aborts in-flight work.
pub const MAX_MISSED_HEARTBEATS: u32 = 3;

/// Scheduler tick: how often cron-due pipelines are advanced into new jobs.
pub const SCHEDULER_TICK: Duration = Duration::from_secs(60);

/// SLA monitor tick: how often each pipeline's last run duration is
/// compared against its configured SLA.
pub const SLA_TICK: Duration = Duration::from_secs(300);

/// Result cache entry lifetime.
pub const RESULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Row cap on an ephemeral `fetch_sample` fallback.
pub const SAMPLE_ROW_LIMIT: usize = 1000;

/// Agent group a job lands in when its pipeline has no `agent_group` and
/// the workspace has no default — meaning "run in-process," not
/// "dispatch to a remote agent."
pub const INTERNAL_AGENT_GROUP: &str = "internal";

/// Default ZeroMQ endpoints.
pub const DEFAULT_CONTROL_BIND_ADDR: &str = "tcp://0.0.0.0:5671";
pub const DEFAULT_AGENT_CONNECT_ADDR: &str = "tcp://127.0.0.1:5671";
