//! Two background ticks: a cron-driven scheduler that enqueues jobs for
//! pipelines whose schedule is due, and an SLA sweep that flags runs that
//! have overrun their configured duration budget.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use synqx_ids::PipelineId;

use crate::error::ControlResult;
use crate::job_store::JobStore;
use crate::pubsub::{PubSub, Topic};

pub struct Scheduler {
    pool: SqlitePool,
    job_store: Arc<JobStore>,
    pubsub: Arc<PubSub>,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, job_store: Arc<JobStore>, pubsub: Arc<PubSub>) -> Self {
        Self { pool, job_store, pubsub }
    }

    /// Enqueues a job for every scheduled pipeline whose cron expression has
    /// a fire time between its `last_scheduled_at` and now. Returns the
    /// number of jobs submitted.
    pub async fn tick(&self) -> ControlResult<usize> {
        let rows = sqlx::query(
            "SELECT id, schedule_cron, agent_group, current_version_id, last_scheduled_at FROM pipelines WHERE schedule_cron IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        let mut submitted = 0;

        for row in rows {
            let pipeline_id_str: String = row.get("id");
            let cron_expr: String = row.get("schedule_cron");
            let current_version_id: Option<String> = row.get("current_version_id");
            let agent_group: Option<String> = row.get("agent_group");
            let last_scheduled_at: Option<String> = row.get("last_scheduled_at");

            let Some(version_id) = current_version_id else {
                continue;
            };

            let schedule = match Schedule::from_str(&cron_expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(pipeline_id = %pipeline_id_str, error = %e, "invalid cron expression, skipping");
                    continue;
                }
            };

            let since = last_scheduled_at
                .as_deref()
                .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);

            let is_due = schedule.after(&since).next().map(|fire_at| fire_at <= now).unwrap_or(false);
            if !is_due {
                continue;
            }

            let pipeline_id = PipelineId::parse(&pipeline_id_str)?;
            let version_id = synqx_ids::PipelineVersionId::parse(&version_id)?;
            let job = self
                .job_store
                .submit_job(
                    pipeline_id,
                    version_id,
                    agent_group.unwrap_or_else(|| "default".to_string()),
                    0,
                    0,
                    synqx_protocol::types::RetryStrategy::Fixed,
                )
                .await?;

            sqlx::query("UPDATE pipelines SET last_scheduled_at = ? WHERE id = ?")
                .bind(now.to_rfc3339())
                .bind(&pipeline_id_str)
                .execute(&self.pool)
                .await?;

            self.pubsub.publish(Topic::Job(job.id.clone()), serde_json::json!({"event": "scheduled"}));
            info!(pipeline_id = %pipeline_id_str, job_id = %job.id, "cron schedule fired");
            submitted += 1;
        }

        Ok(submitted)
    }

    /// Flags running jobs that have exceeded their pipeline's
    /// `sla_seconds` budget. Breaches are published, not auto-cancelled —
    /// cancellation stays an explicit operator action.
    pub async fn sla_sweep(&self) -> ControlResult<usize> {
        let rows = sqlx::query(
            r#"SELECT jobs.id AS job_id, jobs.started_at AS started_at, pipelines.sla_seconds AS sla_seconds
               FROM jobs JOIN pipelines ON pipelines.id = jobs.pipeline_ref
               WHERE jobs.status = 'RUNNING' AND pipelines.sla_seconds IS NOT NULL"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        let mut breaches = 0;
        for row in rows {
            let job_id: String = row.get("job_id");
            let started_at: Option<String> = row.get("started_at");
            let sla_seconds: i64 = row.get("sla_seconds");

            let Some(started_at) = started_at else { continue };
            let Ok(started_at) = chrono::DateTime::parse_from_rfc3339(&started_at) else { continue };
            let elapsed = (now - started_at.with_timezone(&Utc)).num_seconds();
            if elapsed > sla_seconds {
                let job_id = synqx_ids::JobId::parse(&job_id)?;
                self.pubsub.publish(
                    Topic::Job(job_id.clone()),
                    serde_json::json!({"event": "sla_breach", "elapsed_seconds": elapsed, "budget_seconds": sla_seconds}),
                );
                warn!(job_id = %job_id, elapsed, sla_seconds, "job exceeded SLA");
                breaches += 1;
            }
        }
        Ok(breaches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synqx_ids::{PipelineVersionId, WorkspaceId};
    use synqx_protocol::types::RetryPolicy;

    async fn setup() -> (SqlitePool, Arc<JobStore>) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::schema::ensure_schema(&pool).await.unwrap();
        let job_store = Arc::new(JobStore::from_pool(pool.clone()));
        (pool, job_store)
    }

    #[tokio::test]
    async fn tick_submits_a_job_for_a_due_pipeline() {
        let (pool, job_store) = setup().await;
        let pipeline_store = crate::pipeline_store::PipelineStore::new(pool.clone());
        let pipeline = pipeline_store
            .create_pipeline(WorkspaceId::new(), "orders-etl".into(), Some("default".into()), Some("* * * * * *".into()), RetryPolicy::default(), None)
            .await
            .unwrap();
        pipeline_store.publish_version(&pipeline.id, Vec::new(), Vec::new(), None).await.unwrap();

        let scheduler = Scheduler::new(pool, job_store.clone(), Arc::new(PubSub::default()));
        let submitted = scheduler.tick().await.unwrap();
        assert_eq!(submitted, 1);

        let queued = job_store.list_queued("default").await.unwrap();
        assert_eq!(queued.len(), 1);
    }

    #[tokio::test]
    async fn tick_skips_pipelines_without_a_published_version() {
        let (pool, job_store) = setup().await;
        let pipeline_store = crate::pipeline_store::PipelineStore::new(pool.clone());
        pipeline_store
            .create_pipeline(WorkspaceId::new(), "unpublished".into(), None, Some("* * * * * *".into()), RetryPolicy::default(), None)
            .await
            .unwrap();

        let scheduler = Scheduler::new(pool, job_store, Arc::new(PubSub::default()));
        assert_eq!(scheduler.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sla_sweep_flags_overrunning_jobs() {
        let (pool, job_store) = setup().await;
        let pipeline_store = crate::pipeline_store::PipelineStore::new(pool.clone());
        let pipeline = pipeline_store
            .create_pipeline(WorkspaceId::new(), "slow-etl".into(), None, None, RetryPolicy::default(), Some(synqx_protocol::types::SlaConfig { max_duration_seconds: 1 }))
            .await
            .unwrap();
        let version = pipeline_store.publish_version(&pipeline.id, Vec::new(), Vec::new(), None).await.unwrap();

        let job = job_store
            .submit_job(pipeline.id, version.id, "default".into(), 0, 0, synqx_protocol::types::RetryStrategy::Fixed)
            .await
            .unwrap();
        job_store.lease_job(&synqx_ids::AgentId::new(), &["default".into()]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let scheduler = Scheduler::new(pool, job_store, Arc::new(PubSub::default()));
        let breaches = scheduler.sla_sweep().await.unwrap();
        assert_eq!(breaches, 1);
        let _ = job.id;
    }
}
