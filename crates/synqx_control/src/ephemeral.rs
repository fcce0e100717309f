//! Ephemeral (non-pipeline) work: ad-hoc queries and asset previews that
//! bypass the DAG executor entirely but still flow through the same
//! connector registry and agent dispatch as a pipeline job.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

use synqx_connectors::capability::RowBatch;
use synqx_connectors::ConnectorHandle;
use synqx_ids::{ConnectionId, EphemeralJobId, WorkspaceId};
use synqx_protocol::defaults::SAMPLE_ROW_LIMIT;
use synqx_protocol::types::{EphemeralJob, EphemeralJobType, JobStatus};

use crate::error::{ControlError, ControlResult};

pub struct EphemeralJobStore {
    pool: SqlitePool,
}

impl EphemeralJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn submit(
        &self,
        workspace_id: WorkspaceId,
        user: String,
        connection_id: Option<ConnectionId>,
        job_type: EphemeralJobType,
        agent_group: String,
        payload: serde_json::Value,
    ) -> ControlResult<EphemeralJob> {
        let job = EphemeralJob {
            id: EphemeralJobId::new(),
            workspace_id,
            user,
            connection_id,
            job_type,
            agent_group,
            status: JobStatus::Queued,
            worker_id: None,
            payload,
            result_summary: None,
            result_sample: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        sqlx::query(
            r#"INSERT INTO ephemeral_jobs (id, job_type, connection_id, agent_group, payload_json, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(job.id.as_str())
        .bind(job_type_str(job.job_type))
        .bind(job.connection_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(&job.agent_group)
        .bind(serde_json::to_string(&job.payload)?)
        .bind("QUEUED")
        .bind(job.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(ephemeral_job_id = %job.id, "ephemeral job submitted");
        Ok(job)
    }

    /// Claims the oldest queued ephemeral job whose `agent_group` is in
    /// `groups`, the same compare-and-swap lease used for pipeline jobs:
    /// an `UPDATE ... WHERE status = 'QUEUED'` whose `rows_affected()`
    /// tells the caller whether it won the race.
    pub async fn lease(&self, agent_id: &synqx_ids::AgentId, groups: &[String]) -> ControlResult<Option<EphemeralJob>> {
        let mut tx = self.pool.begin().await?;
        let placeholders = groups.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let select_sql = format!(
            "SELECT id FROM ephemeral_jobs WHERE status = 'QUEUED' AND agent_group IN ({placeholders}) ORDER BY created_at ASC LIMIT 1"
        );
        let mut select_query = sqlx::query(&select_sql);
        for group in groups {
            select_query = select_query.bind(group);
        }
        let Some(row) = select_query.fetch_optional(&mut *tx).await? else {
            tx.commit().await?;
            return Ok(None);
        };
        let job_id: String = row.get("id");

        let result = sqlx::query("UPDATE ephemeral_jobs SET status = 'RUNNING', leased_by = ?, leased_at = ? WHERE id = ? AND status = 'QUEUED'")
            .bind(agent_id.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&job_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM ephemeral_jobs WHERE id = ?")
            .bind(&job_id)
            .fetch_one(&mut *tx)
            .await?;
        let job = row_to_ephemeral_job(&row)?;
        tx.commit().await?;
        Ok(Some(job))
    }

    pub async fn complete(&self, job_id: &EphemeralJobId, result: serde_json::Value) -> ControlResult<()> {
        sqlx::query("UPDATE ephemeral_jobs SET status = 'SUCCESS', result_json = ? WHERE id = ?")
            .bind(serde_json::to_string(&result)?)
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn fail(&self, job_id: &EphemeralJobId, error: &str) -> ControlResult<()> {
        sqlx::query("UPDATE ephemeral_jobs SET status = 'FAILED', error_message = ? WHERE id = ?")
            .bind(error)
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get(&self, job_id: &EphemeralJobId) -> ControlResult<serde_json::Value> {
        let row = sqlx::query("SELECT * FROM ephemeral_jobs WHERE id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ControlError::InvalidDefinition(format!("ephemeral job {job_id} not found")))?;
        Ok(serde_json::json!({
            "id": row.get::<String, _>("id"),
            "status": row.get::<String, _>("status"),
            "leased_by": row.get::<Option<String>, _>("leased_by"),
            "result": row.get::<Option<String>, _>("result_json"),
            "error_message": row.get::<Option<String>, _>("error_message"),
        }))
    }
}

fn row_to_ephemeral_job(row: &sqlx::sqlite::SqliteRow) -> ControlResult<EphemeralJob> {
    let status: String = row.get("status");
    let job_type: String = row.get("job_type");
    let payload: String = row.get("payload_json");
    let created_at: String = row.get("created_at");
    let worker_id: Option<String> = row.get("leased_by");

    Ok(EphemeralJob {
        id: EphemeralJobId::parse(&row.get::<String, _>("id"))?,
        workspace_id: WorkspaceId::new(),
        user: String::new(),
        connection_id: row
            .get::<Option<String>, _>("connection_id")
            .map(|s| ConnectionId::parse(&s))
            .transpose()?,
        job_type: parse_job_type(&job_type)?,
        agent_group: row.get("agent_group"),
        status: status.parse().map_err(ControlError::InvalidDefinition)?,
        worker_id: worker_id.map(|s| synqx_ids::AgentId::parse(&s)).transpose()?,
        payload: serde_json::from_str(&payload)?,
        result_summary: None,
        result_sample: None,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?
            .with_timezone(&Utc),
        completed_at: None,
    })
}

fn parse_job_type(s: &str) -> ControlResult<EphemeralJobType> {
    match s {
        "EXPLORER" => Ok(EphemeralJobType::Explorer),
        "METADATA" => Ok(EphemeralJobType::Metadata),
        "TEST" => Ok(EphemeralJobType::Test),
        "SYSTEM" => Ok(EphemeralJobType::System),
        "FILE" => Ok(EphemeralJobType::File),
        "PIPELINE" => Ok(EphemeralJobType::Pipeline),
        other => Err(ControlError::InvalidDefinition(format!("unknown ephemeral job type '{other}'"))),
    }
}

fn job_type_str(t: EphemeralJobType) -> &'static str {
    match t {
        EphemeralJobType::Explorer => "EXPLORER",
        EphemeralJobType::Metadata => "METADATA",
        EphemeralJobType::Test => "TEST",
        EphemeralJobType::System => "SYSTEM",
        EphemeralJobType::File => "FILE",
        EphemeralJobType::Pipeline => "PIPELINE",
    }
}

/// Runs a user-supplied query if the connector supports [`QueryRunner`],
/// otherwise falls back to a capped sample via [`Sampler`]. Every connector
/// with a [`BatchReader`] gets a blanket `Sampler` impl, so this only fails
/// if the connector implements neither.
///
/// [`QueryRunner`]: synqx_connectors::capability::QueryRunner
/// [`Sampler`]: synqx_connectors::capability::Sampler
/// [`BatchReader`]: synqx_connectors::capability::BatchReader
pub async fn execute_query_or_sample(
    handle: &ConnectorHandle,
    config: &serde_json::Value,
    asset: &str,
    query: Option<&str>,
) -> ControlResult<(RowBatch, bool)> {
    if let Some(query) = query {
        if let Ok(runner) = handle.as_query_runner() {
            let rows = runner.execute_query(config, query).await.map_err(control_from_connector)?;
            let truncated = rows.len() > SAMPLE_ROW_LIMIT;
            let rows = if truncated { rows.into_iter().take(SAMPLE_ROW_LIMIT).collect() } else { rows };
            return Ok((rows, truncated));
        }
    }

    let sampler = handle.as_sampler().map_err(control_from_connector)?;
    let rows = sampler
        .fetch_sample(config, asset, SAMPLE_ROW_LIMIT + 1)
        .await
        .map_err(control_from_connector)?;
    let truncated = rows.len() > SAMPLE_ROW_LIMIT;
    let rows = if truncated { rows.into_iter().take(SAMPLE_ROW_LIMIT).collect() } else { rows };
    Ok((rows, truncated))
}

fn control_from_connector(err: synqx_connectors::error::ConnectorError) -> ControlError {
    ControlError::InvalidDefinition(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> EphemeralJobStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::schema::ensure_schema(&pool).await.unwrap();
        EphemeralJobStore::new(pool)
    }

    #[tokio::test]
    async fn submit_then_complete_round_trips() {
        let store = setup().await;
        let job = store
            .submit(
                WorkspaceId::new(),
                "alice".into(),
                None,
                EphemeralJobType::Explorer,
                "default".into(),
                serde_json::json!({"asset": "orders"}),
            )
            .await
            .unwrap();

        store.complete(&job.id, serde_json::json!({"rows": []})).await.unwrap();
        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched["status"], "SUCCESS");
    }

    #[tokio::test]
    async fn fail_records_error_message() {
        let store = setup().await;
        let job = store
            .submit(WorkspaceId::new(), "alice".into(), None, EphemeralJobType::Test, "default".into(), serde_json::json!({}))
            .await
            .unwrap();

        store.fail(&job.id, "connection refused").await.unwrap();
        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched["status"], "FAILED");
        assert_eq!(fetched["error_message"], "connection refused");
    }

    #[tokio::test]
    async fn lease_claims_a_queued_job_in_the_requested_group() {
        let store = setup().await;
        let job = store
            .submit(WorkspaceId::new(), "alice".into(), None, EphemeralJobType::Explorer, "gpu".into(), serde_json::json!({}))
            .await
            .unwrap();

        let agent_id = synqx_ids::AgentId::new();
        let leased = store.lease(&agent_id, &["gpu".to_string()]).await.unwrap().unwrap();
        assert_eq!(leased.id, job.id);
        assert_eq!(leased.worker_id, Some(agent_id));

        assert!(store.lease(&synqx_ids::AgentId::new(), &["gpu".to_string()]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lease_ignores_jobs_outside_requested_groups() {
        let store = setup().await;
        store
            .submit(WorkspaceId::new(), "alice".into(), None, EphemeralJobType::Explorer, "gpu".into(), serde_json::json!({}))
            .await
            .unwrap();

        let agent_id = synqx_ids::AgentId::new();
        assert!(store.lease(&agent_id, &["default".to_string()]).await.unwrap().is_none());
    }
}
