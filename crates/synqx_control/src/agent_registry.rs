//! Agent fleet registry: enrollment, credential verification, heartbeats,
//! and tag-group routing lookups over the `agents` table.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

use synqx_ids::{AgentId, WorkspaceId};
use synqx_protocol::defaults::AGENT_LIVENESS_WINDOW;
use synqx_protocol::types::{Agent, AgentStatus};

use crate::error::{ControlError, ControlResult};

pub struct AgentRegistry {
    pool: SqlitePool,
}

impl AgentRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Enrolls a new agent, returning its id and the plaintext API key.
    /// The plaintext is returned exactly once; only its hash is persisted.
    pub async fn enroll(
        &self,
        workspace_id: WorkspaceId,
        display_name: String,
        groups: Vec<String>,
    ) -> ControlResult<(AgentId, String)> {
        let api_key = synqx_security::generate_api_key();
        let hashed = synqx_security::hash_api_key(&api_key);
        let agent = Agent {
            id: AgentId::new(),
            workspace_id,
            client_id: api_key.split('_').nth(1).unwrap_or(&api_key).to_string(),
            hashed_secret: hashed,
            display_name,
            groups,
            status: AgentStatus::Online,
            last_heartbeat_at: None,
            ip_address: None,
            version: None,
            system_info: None,
        };

        sqlx::query(
            r#"INSERT INTO agents
                (id, workspace_id, client_id, hashed_secret, display_name, groups_json, status)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(agent.id.as_str())
        .bind(agent.workspace_id.as_str())
        .bind(&agent.client_id)
        .bind(&agent.hashed_secret)
        .bind(&agent.display_name)
        .bind(serde_json::to_string(&agent.groups)?)
        .bind(agent_status_str(agent.status))
        .execute(&self.pool)
        .await?;

        info!(agent_id = %agent.id, display_name = %agent.display_name, "agent enrolled");
        Ok((agent.id, api_key))
    }

    pub async fn authenticate(&self, client_id: &str, presented_key: &str) -> ControlResult<Agent> {
        let agent = self.get_by_client_id(client_id).await?;
        if synqx_security::verify_api_key(presented_key, &agent.hashed_secret) {
            Ok(agent)
        } else {
            Err(ControlError::AuthRejected)
        }
    }

    pub async fn heartbeat(&self, agent_id: &AgentId, ip_address: Option<String>, version: Option<String>) -> ControlResult<()> {
        let now = Utc::now();
        let rows = sqlx::query(
            r#"UPDATE agents SET last_heartbeat_at = ?, status = 'ONLINE', ip_address = COALESCE(?, ip_address),
                   version = COALESCE(?, version)
               WHERE id = ?"#,
        )
        .bind(now.to_rfc3339())
        .bind(ip_address)
        .bind(version)
        .bind(agent_id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(ControlError::AgentNotFound(agent_id.clone()));
        }
        Ok(())
    }

    pub async fn get(&self, agent_id: &AgentId) -> ControlResult<Agent> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ControlError::AgentNotFound(agent_id.clone()))?;
        row_to_agent(row)
    }

    async fn get_by_client_id(&self, client_id: &str) -> ControlResult<Agent> {
        let row = sqlx::query("SELECT * FROM agents WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ControlError::AuthRejected)?;
        row_to_agent(row)
    }

    /// Agents eligible for `group`, with effective (heartbeat-derived) status
    /// substituted for the stored column.
    pub async fn online_in_group(&self, group: &str) -> ControlResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents").fetch_all(&self.pool).await?;
        let now = Utc::now();
        let mut agents = Vec::new();
        for row in rows {
            let agent = row_to_agent(row)?;
            if agent.is_in_group(group) && agent.effective_status(now, AGENT_LIVENESS_WINDOW.as_secs() as i64) == AgentStatus::Online {
                agents.push(agent);
            }
        }
        Ok(agents)
    }
}

fn agent_status_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Online => "ONLINE",
        AgentStatus::Offline => "OFFLINE",
        AgentStatus::Draining => "DRAINING",
    }
}

fn parse_agent_status(s: &str) -> AgentStatus {
    match s {
        "OFFLINE" => AgentStatus::Offline,
        "DRAINING" => AgentStatus::Draining,
        _ => AgentStatus::Online,
    }
}

fn row_to_agent(row: sqlx::sqlite::SqliteRow) -> ControlResult<Agent> {
    let groups: String = row.get("groups_json");
    Ok(Agent {
        id: AgentId::parse(&row.get::<String, _>("id")).map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        workspace_id: WorkspaceId::parse(&row.get::<String, _>("workspace_id"))
            .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        client_id: row.get("client_id"),
        hashed_secret: row.get("hashed_secret"),
        display_name: row.get("display_name"),
        groups: serde_json::from_str(&groups)?,
        status: parse_agent_status(&row.get::<String, _>("status")),
        last_heartbeat_at: row
            .get::<Option<String>, _>("last_heartbeat_at")
            .map(|raw| chrono::DateTime::parse_from_rfc3339(&raw).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| ControlError::InvalidDefinition(e.to_string()))?,
        ip_address: row.get("ip_address"),
        version: row.get("version"),
        system_info: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> AgentRegistry {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::schema::ensure_schema(&pool).await.unwrap();
        AgentRegistry::new(pool)
    }

    #[tokio::test]
    async fn enroll_then_authenticate_round_trips() {
        let registry = setup().await;
        let (agent_id, api_key) = registry
            .enroll(WorkspaceId::new(), "worker-1".into(), vec!["default".into()])
            .await
            .unwrap();

        let agent = registry.get(&agent_id).await.unwrap();
        let authed = registry.authenticate(&agent.client_id, &api_key).await.unwrap();
        assert_eq!(authed.id, agent_id);
    }

    #[tokio::test]
    async fn authenticate_rejects_wrong_key() {
        let registry = setup().await;
        let (_agent_id, _) = registry
            .enroll(WorkspaceId::new(), "worker-1".into(), vec!["default".into()])
            .await
            .unwrap();
        let agent = registry.get(&_agent_id).await.unwrap();
        let err = registry.authenticate(&agent.client_id, "wrong-key").await.unwrap_err();
        assert!(matches!(err, ControlError::AuthRejected));
    }

    #[tokio::test]
    async fn heartbeat_keeps_agent_online_in_group_listing() {
        let registry = setup().await;
        let (agent_id, _) = registry
            .enroll(WorkspaceId::new(), "worker-1".into(), vec!["GPU".into()])
            .await
            .unwrap();
        registry.heartbeat(&agent_id, None, None).await.unwrap();

        let online = registry.online_in_group("gpu").await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, agent_id);
    }
}
