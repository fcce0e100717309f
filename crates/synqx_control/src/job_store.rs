//! Job queue: atomic lease/complete/fail/cancel over the `jobs` table.
//! Claiming follows the same SELECT-then-CAS-UPDATE pattern as a row-locked
//! queue: a transaction picks the best candidate row, then an
//! `UPDATE ... WHERE status = 'QUEUED'` either claims it or reports a lost
//! race via `rows_affected() == 0`, in which case the caller just tries
//! again on the next tick.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

use synqx_ids::{AgentId, JobId, PipelineId, PipelineVersionId};
use synqx_protocol::types::{Job, JobStatus, RetryStrategy};

use crate::error::{ControlError, ControlResult};

pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub async fn connect(database_url: &str) -> ControlResult<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        crate::schema::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn submit_job(
        &self,
        pipeline_ref: PipelineId,
        pipeline_version_ref: PipelineVersionId,
        agent_group: String,
        priority: i32,
        max_retries: u32,
        retry_strategy: RetryStrategy,
    ) -> ControlResult<Job> {
        let job = Job {
            id: JobId::new(),
            pipeline_ref,
            pipeline_version_ref,
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries,
            retry_strategy,
            agent_group,
            worker_id: None,
            correlation_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            infra_error: None,
            is_backfill: false,
            backfill_config: None,
        };
        self.insert_job(&job, priority).await?;
        info!(job_id = %job.id, pipeline_ref = %job.pipeline_ref, "job submitted");
        Ok(job)
    }

    async fn insert_job(&self, job: &Job, priority: i32) -> ControlResult<()> {
        sqlx::query(
            r#"INSERT INTO jobs
                (id, pipeline_ref, pipeline_version_ref, status, priority, agent_group,
                 retry_count, max_retries, retry_strategy, leased_by, leased_at,
                 created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(job.id.as_str())
        .bind(job.pipeline_ref.as_str())
        .bind(job.pipeline_version_ref.as_str())
        .bind(job.status.to_string())
        .bind(priority)
        .bind(&job.agent_group)
        .bind(job.retry_count as i64)
        .bind(job.max_retries as i64)
        .bind(retry_strategy_str(job.retry_strategy))
        .bind(job.worker_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(job.started_at.map(|ts| ts.to_rfc3339()))
        .bind(job.created_at.to_rfc3339())
        .bind(job.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Claims the highest-priority `QUEUED` job whose `agent_group` is one
    /// of `groups`, or `None` if the queue is empty for that group set.
    pub async fn lease_job(&self, agent_id: &AgentId, groups: &[String]) -> ControlResult<Option<Job>> {
        if groups.is_empty() {
            return Ok(None);
        }
        let mut tx = self.pool.begin().await?;

        let placeholders = groups.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let select_sql = format!(
            "SELECT id FROM jobs WHERE status = 'QUEUED' AND agent_group IN ({placeholders}) \
             ORDER BY priority DESC, created_at ASC LIMIT 1"
        );
        let mut select_query = sqlx::query(&select_sql);
        for group in groups {
            select_query = select_query.bind(group);
        }
        let job_id: Option<String> = select_query
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get::<String, _>("id"));

        let Some(job_id) = job_id else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = Utc::now();
        let rows_affected = sqlx::query(
            r#"UPDATE jobs SET status = 'RUNNING', leased_by = ?, leased_at = ?,
                   started_at = ?, updated_at = ?
               WHERE id = ? AND status = 'QUEUED'"#,
        )
        .bind(agent_id.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(&job_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            tx.commit().await?;
            return Ok(None);
        }

        let job = fetch_job_row(&mut *tx, &job_id).await?;
        tx.commit().await?;
        info!(job_id = %job.id, agent_id = %agent_id, "job leased");
        Ok(Some(job))
    }

    pub async fn get_job(&self, job_id: &JobId) -> ControlResult<Job> {
        fetch_job_row(&self.pool, job_id.as_str()).await
    }

    pub async fn complete_job(&self, job_id: &JobId) -> ControlResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE jobs SET status = 'SUCCESS', completed_at = ?, updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
        info!(job_id = %job_id, "job completed");
        Ok(())
    }

    /// Fails a job. If retries remain, re-enqueues as `QUEUED` with
    /// `retry_count` incremented instead of marking it terminally `FAILED`.
    pub async fn fail_job(&self, job_id: &JobId, error: &str) -> ControlResult<()> {
        let job = self.get_job(job_id).await?;
        let now = Utc::now();
        if job.retry_count < job.max_retries {
            sqlx::query(
                r#"UPDATE jobs SET status = 'QUEUED', retry_count = retry_count + 1,
                       leased_by = NULL, leased_at = NULL, infra_error = ?, updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(error)
            .bind(now.to_rfc3339())
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
            info!(job_id = %job_id, retry_count = job.retry_count + 1, "job requeued after failure");
        } else {
            sqlx::query(
                r#"UPDATE jobs SET status = 'FAILED', completed_at = ?, infra_error = ?, updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(now.to_rfc3339())
            .bind(error)
            .bind(now.to_rfc3339())
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
            info!(job_id = %job_id, "job failed permanently");
        }
        Ok(())
    }

    pub async fn cancel_job(&self, job_id: &JobId) -> ControlResult<()> {
        let job = self.get_job(job_id).await?;
        if job.status.is_terminal() {
            return Err(ControlError::NotCancellable(job_id.clone()));
        }
        let now = Utc::now();
        sqlx::query("UPDATE jobs SET status = 'CANCELLED', completed_at = ?, updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
        info!(job_id = %job_id, "job cancelled");
        Ok(())
    }

    pub async fn list_queued(&self, agent_group: &str) -> ControlResult<Vec<Job>> {
        let ids: Vec<String> = sqlx::query(
            "SELECT id FROM jobs WHERE status = 'QUEUED' AND agent_group = ? ORDER BY priority DESC, created_at ASC",
        )
        .bind(agent_group)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("id"))
        .collect();

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            jobs.push(fetch_job_row(&self.pool, &id).await?);
        }
        Ok(jobs)
    }
}

fn retry_strategy_str(strategy: RetryStrategy) -> &'static str {
    match strategy {
        RetryStrategy::Fixed => "fixed",
        RetryStrategy::Exponential => "exponential",
        RetryStrategy::Linear => "linear",
    }
}

fn parse_retry_strategy(s: &str) -> RetryStrategy {
    match s {
        "exponential" => RetryStrategy::Exponential,
        "linear" => RetryStrategy::Linear,
        _ => RetryStrategy::Fixed,
    }
}

async fn fetch_job_row<'a, E>(executor: E, job_id: &str) -> ControlResult<Job>
where
    E: sqlx::Executor<'a, Database = sqlx::Sqlite>,
{
    let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| ControlError::JobNotFound(JobId::parse(job_id).unwrap_or_else(|_| JobId::new())))?;

    Ok(Job {
        id: JobId::parse(&row.get::<String, _>("id")).map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        pipeline_ref: PipelineId::parse(&row.get::<String, _>("pipeline_ref"))
            .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        pipeline_version_ref: PipelineVersionId::parse(&row.get::<String, _>("pipeline_version_ref"))
            .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        status: row
            .get::<String, _>("status")
            .parse()
            .map_err(ControlError::InvalidDefinition)?,
        retry_count: row.get::<i64, _>("retry_count") as u32,
        max_retries: row.get::<i64, _>("max_retries") as u32,
        retry_strategy: parse_retry_strategy(&row.get::<String, _>("retry_strategy")),
        agent_group: row.get("agent_group"),
        worker_id: row
            .get::<Option<String>, _>("leased_by")
            .map(|s| AgentId::parse(&s))
            .transpose()
            .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        correlation_id: None,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        started_at: row.get::<Option<String>, _>("leased_at").map(|s| parse_ts(&s)).transpose()?,
        completed_at: None,
        infra_error: None,
        is_backfill: false,
        backfill_config: None,
    })
}

fn parse_ts(raw: &str) -> ControlResult<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ControlError::InvalidDefinition(format!("bad timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> JobStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::schema::ensure_schema(&pool).await.unwrap();
        JobStore::from_pool(pool)
    }

    #[tokio::test]
    async fn lease_returns_none_on_empty_queue() {
        let store = setup().await;
        let leased = store.lease_job(&AgentId::new(), &["default".into()]).await.unwrap();
        assert!(leased.is_none());
    }

    #[tokio::test]
    async fn lease_claims_highest_priority_job_in_group() {
        let store = setup().await;
        let pipeline_ref = PipelineId::new();
        let version_ref = PipelineVersionId::new();

        store
            .submit_job(pipeline_ref.clone(), version_ref.clone(), "default".into(), 0, 0, RetryStrategy::Fixed)
            .await
            .unwrap();
        let high = store
            .submit_job(pipeline_ref.clone(), version_ref.clone(), "default".into(), 10, 0, RetryStrategy::Fixed)
            .await
            .unwrap();

        let leased = store
            .lease_job(&AgentId::new(), &["default".into()])
            .await
            .unwrap()
            .expect("a job to be claimed");
        assert_eq!(leased.id, high.id);
        assert_eq!(leased.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn lease_ignores_jobs_outside_requested_groups() {
        let store = setup().await;
        store
            .submit_job(PipelineId::new(), PipelineVersionId::new(), "gpu".into(), 0, 0, RetryStrategy::Fixed)
            .await
            .unwrap();

        let leased = store.lease_job(&AgentId::new(), &["default".into()]).await.unwrap();
        assert!(leased.is_none());
    }

    #[tokio::test]
    async fn fail_job_requeues_while_retries_remain() {
        let store = setup().await;
        let job = store
            .submit_job(PipelineId::new(), PipelineVersionId::new(), "default".into(), 0, 2, RetryStrategy::Fixed)
            .await
            .unwrap();
        store.lease_job(&AgentId::new(), &["default".into()]).await.unwrap();

        store.fail_job(&job.id, "connector timeout").await.unwrap();
        let reloaded = store.get_job(&job.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Queued);
        assert_eq!(reloaded.retry_count, 1);
    }

    #[tokio::test]
    async fn fail_job_terminates_once_retries_exhausted() {
        let store = setup().await;
        let job = store
            .submit_job(PipelineId::new(), PipelineVersionId::new(), "default".into(), 0, 0, RetryStrategy::Fixed)
            .await
            .unwrap();

        store.fail_job(&job.id, "boom").await.unwrap();
        let reloaded = store.get_job(&job.id).await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_rejects_terminal_jobs() {
        let store = setup().await;
        let job = store
            .submit_job(PipelineId::new(), PipelineVersionId::new(), "default".into(), 0, 0, RetryStrategy::Fixed)
            .await
            .unwrap();
        store.complete_job(&job.id).await.unwrap();
        let err = store.cancel_job(&job.id).await.unwrap_err();
        assert!(matches!(err, ControlError::NotCancellable(_)));
    }
}
