//! CRUD over `pipelines` and `pipeline_versions`. A pipeline's DAG shape
//! lives entirely inside its current `PipelineVersion` — publishing a new
//! version never mutates an old one, so a running job always sees the exact
//! node/edge set it was leased against.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

use synqx_ids::{PipelineId, PipelineVersionId, WorkspaceId};
use synqx_protocol::types::{Edge, Node, Pipeline, PipelineVersion, RetryPolicy, SlaConfig};

use crate::error::{ControlError, ControlResult};

pub struct PipelineStore {
    pool: SqlitePool,
}

impl PipelineStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_pipeline(
        &self,
        workspace_id: WorkspaceId,
        name: String,
        agent_group: Option<String>,
        cron_schedule: Option<String>,
        retry_policy: RetryPolicy,
        sla: Option<SlaConfig>,
    ) -> ControlResult<Pipeline> {
        let pipeline = Pipeline {
            id: PipelineId::new(),
            workspace_id,
            name,
            agent_group,
            cron_schedule,
            retry_policy,
            sla,
            tags: Vec::new(),
            priority: 0,
            published_version: None,
        };

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO pipelines (id, workspace_id, name, schedule_cron, agent_group, sla_seconds, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(pipeline.id.as_str())
        .bind(pipeline.workspace_id.as_str())
        .bind(&pipeline.name)
        .bind(&pipeline.cron_schedule)
        .bind(&pipeline.agent_group)
        .bind(pipeline.sla.as_ref().map(|s| s.max_duration_seconds as i64))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(pipeline_id = %pipeline.id, name = %pipeline.name, "pipeline created");
        Ok(pipeline)
    }

    /// Publishes a new DAG snapshot and points the pipeline's
    /// `current_version_id` at it.
    pub async fn publish_version(&self, pipeline_id: &PipelineId, nodes: Vec<Node>, edges: Vec<Edge>, notes: Option<String>) -> ControlResult<PipelineVersion> {
        let existing = self.list_versions(pipeline_id).await?;
        let version = PipelineVersion {
            id: PipelineVersionId::new(),
            pipeline_id: pipeline_id.clone(),
            version_number: existing.len() as u32 + 1,
            nodes,
            edges,
            notes,
            published: true,
        };

        sqlx::query("INSERT INTO pipeline_versions (id, pipeline_id, nodes_json, edges_json, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(version.id.as_str())
            .bind(pipeline_id.as_str())
            .bind(serde_json::to_string(&version.nodes)?)
            .bind(serde_json::to_string(&version.edges)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE pipelines SET current_version_id = ?, updated_at = ? WHERE id = ?")
            .bind(version.id.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(pipeline_id.as_str())
            .execute(&self.pool)
            .await?;

        info!(pipeline_id = %pipeline_id, version_id = %version.id, version_number = version.version_number, "pipeline version published");
        Ok(version)
    }

    pub async fn get_pipeline(&self, pipeline_id: &PipelineId) -> ControlResult<Pipeline> {
        let row = sqlx::query("SELECT * FROM pipelines WHERE id = ?")
            .bind(pipeline_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ControlError::InvalidDefinition(format!("pipeline {pipeline_id} not found")))?;

        Ok(Pipeline {
            id: PipelineId::parse(&row.get::<String, _>("id")).map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
            workspace_id: WorkspaceId::parse(&row.get::<String, _>("workspace_id"))
                .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
            name: row.get("name"),
            agent_group: row.get("agent_group"),
            cron_schedule: row.get("schedule_cron"),
            retry_policy: RetryPolicy::default(),
            sla: row
                .get::<Option<i64>, _>("sla_seconds")
                .map(|secs| SlaConfig { max_duration_seconds: secs as u64 }),
            tags: Vec::new(),
            priority: 0,
            published_version: row
                .get::<Option<String>, _>("current_version_id")
                .map(|s| PipelineVersionId::parse(&s))
                .transpose()
                .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        })
    }

    pub async fn get_version(&self, version_id: &PipelineVersionId) -> ControlResult<PipelineVersion> {
        let row = sqlx::query("SELECT * FROM pipeline_versions WHERE id = ?")
            .bind(version_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ControlError::InvalidDefinition(format!("pipeline version {version_id} not found")))?;

        Ok(PipelineVersion {
            id: PipelineVersionId::parse(&row.get::<String, _>("id")).map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
            pipeline_id: PipelineId::parse(&row.get::<String, _>("pipeline_id"))
                .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
            version_number: 0,
            nodes: serde_json::from_str(&row.get::<String, _>("nodes_json"))?,
            edges: serde_json::from_str(&row.get::<String, _>("edges_json"))?,
            notes: None,
            published: true,
        })
    }

    async fn list_versions(&self, pipeline_id: &PipelineId) -> ControlResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM pipeline_versions WHERE pipeline_id = ?")
            .bind(pipeline_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get::<String, _>("id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synqx_protocol::types::OperatorType;

    async fn setup() -> PipelineStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::schema::ensure_schema(&pool).await.unwrap();
        PipelineStore::new(pool)
    }

    fn sample_node() -> Node {
        Node {
            node_id: synqx_ids::NodeId::new("extract_orders"),
            operator_type: OperatorType::Extract,
            operator_class: "extract.generic".into(),
            config: serde_json::json!({}),
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            source_asset_ref: None,
            destination_asset_ref: None,
            connection_ref: None,
            guardrails: Vec::new(),
            data_contract: None,
            quarantine_asset_ref: None,
            write_strategy: Default::default(),
            schema_evolution_policy: Default::default(),
        }
    }

    #[tokio::test]
    async fn publish_version_bumps_pipeline_current_version() {
        let store = setup().await;
        let pipeline = store
            .create_pipeline(WorkspaceId::new(), "orders-etl".into(), None, None, RetryPolicy::default(), None)
            .await
            .unwrap();

        let version = store.publish_version(&pipeline.id, vec![sample_node()], Vec::new(), None).await.unwrap();
        assert_eq!(version.version_number, 1);

        let reloaded = store.get_pipeline(&pipeline.id).await.unwrap();
        assert_eq!(reloaded.published_version, Some(version.id.clone()));

        let fetched_version = store.get_version(&version.id).await.unwrap();
        assert_eq!(fetched_version.nodes.len(), 1);
    }
}
