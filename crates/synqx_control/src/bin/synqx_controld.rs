//! SynqX control plane daemon.
//!
//! Usage:
//!     synqx-controld --database sqlite://synqx.db --bind tcp://0.0.0.0:5671

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synqx_control::job_store::JobStore;
use synqx_control::scheduler::Scheduler;
use synqx_control::pubsub::PubSub;
use synqx_protocol::defaults::{DEFAULT_CONTROL_BIND_ADDR, SCHEDULER_TICK, SLA_TICK};

#[derive(Parser, Debug)]
#[command(name = "synqx-controld", about = "SynqX job control plane")]
struct Args {
    /// Sqlite connection string (e.g. sqlite://synqx.db, or sqlite::memory: for a throwaway run).
    #[arg(long, default_value = "sqlite://synqx.db")]
    database: String,

    /// Address agents dial in on. Not yet wired to a real listener; recorded
    /// for parity with the agent's `--connect` flag.
    #[arg(long, default_value_t = DEFAULT_CONTROL_BIND_ADDR.to_string())]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "synqx_control=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!(database = %args.database, bind = %args.bind, "starting synqx-controld");

    let pool = sqlx::SqlitePool::connect(&args.database).await?;
    synqx_control::schema::ensure_schema(&pool).await?;

    let job_store = std::sync::Arc::new(JobStore::from_pool(pool.clone()));
    let pubsub = std::sync::Arc::new(PubSub::default());
    let scheduler = Scheduler::new(pool, job_store, pubsub);

    let mut scheduler_tick = tokio::time::interval(SCHEDULER_TICK);
    let mut sla_tick = tokio::time::interval(SLA_TICK);

    loop {
        tokio::select! {
            _ = scheduler_tick.tick() => {
                match scheduler.tick().await {
                    Ok(n) if n > 0 => tracing::info!(submitted = n, "scheduler tick submitted jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "scheduler tick failed"),
                }
            }
            _ = sla_tick.tick() => {
                match scheduler.sla_sweep().await {
                    Ok(n) if n > 0 => tracing::warn!(breaches = n, "SLA sweep found overrunning jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "SLA sweep failed"),
                }
            }
        }
    }
}
