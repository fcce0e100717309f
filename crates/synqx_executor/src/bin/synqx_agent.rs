//! SynqX Agent (Rust)
//!
//! Usage:
//!     synqx-agent --connect tcp://127.0.0.1:5671 --group default

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synqx_connectors::{ConnectorRegistry, EnginePool};
use synqx_dag::graph::PipelinePlan;
use synqx_executor::{Executor, RunContext};
use synqx_protocol::defaults::{DEFAULT_AGENT_CONNECT_ADDR, HEARTBEAT_PERIOD, INTERNAL_AGENT_GROUP};
use synqx_runtime::OperatorRegistry;

#[derive(Parser, Debug)]
#[command(name = "synqx-agent", about = "SynqX pipeline execution agent")]
struct Args {
    /// Control plane address this agent dials out to.
    #[arg(long, default_value_t = DEFAULT_AGENT_CONNECT_ADDR.to_string())]
    connect: String,

    /// Tag group this agent accepts work for.
    #[arg(long, default_value_t = INTERNAL_AGENT_GROUP.to_string())]
    group: String,

    /// Agent ID (auto-generated if not provided).
    #[arg(long)]
    agent_id: Option<String>,

    /// Upper bound on concurrent nodes within one DAG layer. 0 = num_cpus * 2.
    #[arg(long, default_value_t = 0)]
    max_workers: usize,

    /// Row batch size an EXTRACT node requests per page.
    #[arg(long, default_value_t = 10_000)]
    batch_size: usize,

    /// Run a single `PipelinePlan` read from this JSON file and exit,
    /// bypassing the control plane. Useful for local testing without a
    /// running `synqx-controld`.
    #[arg(long)]
    plan: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "synqx_executor=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let agent_id = args.agent_id.unwrap_or_else(|| format!("rust-{}", uuid::Uuid::new_v4().simple()));

    tracing::info!(agent_id, connect = %args.connect, group = %args.group, "starting synqx-agent");

    let operator_registry = Arc::new(OperatorRegistry::with_builtins());
    let connector_registry = Arc::new(ConnectorRegistry::default());
    synqx_connectors::connectors::register_builtins(&connector_registry);
    let engine_pool = Arc::new(EnginePool::default());

    if let Some(plan_path) = args.plan {
        return run_local_plan(&plan_path, operator_registry, connector_registry, engine_pool, args.max_workers, args.batch_size).await;
    }

    tracing::warn!("no control plane client wired yet; idling on heartbeat interval (local-plan mode is the only way to execute work today)");
    loop {
        tokio::time::sleep(HEARTBEAT_PERIOD).await;
        tracing::debug!(agent_id, "heartbeat");
    }
}

async fn run_local_plan(
    plan_path: &PathBuf,
    operator_registry: Arc<OperatorRegistry>,
    connector_registry: Arc<ConnectorRegistry>,
    engine_pool: Arc<EnginePool>,
    max_workers: usize,
    default_batch_size: usize,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(plan_path)?;
    let plan: PipelinePlan = serde_json::from_str(&raw)?;

    let ctx = RunContext {
        pipeline_run_id: synqx_ids::PipelineRunId::new(),
        pipeline_version_id: synqx_ids::PipelineVersionId::new(),
        operator_registry,
        connector_registry,
        engine_pool,
        connections: Arc::new(Default::default()),
        assets: Arc::new(Default::default()),
        cancellation: CancellationToken::new(),
        max_workers,
        on_chunk: Arc::new(|event| tracing::debug!(?event, "chunk")),
        default_batch_size,
        forensic_buffer_bytes: 10 * 1024 * 1024,
    };

    let outcome = Executor::run(&plan, ctx).await?;
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "status": format!("{:?}", outcome.status),
        "records_in": outcome.records_in,
        "records_out": outcome.records_out,
        "records_failed": outcome.records_failed,
        "bytes_processed": outcome.bytes_processed,
        "duration_ms": outcome.duration_ms,
        "step_count": outcome.step_runs.len(),
    }))?);

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
