//! CREATE TABLE statements for the control plane's SQLite-backed store.
//! One function per table group, single source of truth, run idempotently
//! on `JobStore::connect`.

use sqlx::SqlitePool;

use crate::error::ControlResult;

pub async fn ensure_schema(pool: &SqlitePool) -> ControlResult<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS pipelines (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            name TEXT NOT NULL,
            current_version_id TEXT,
            schedule_cron TEXT,
            agent_group TEXT,
            sla_seconds INTEGER,
            last_scheduled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS pipeline_versions (
            id TEXT PRIMARY KEY,
            pipeline_id TEXT NOT NULL REFERENCES pipelines(id),
            nodes_json TEXT NOT NULL,
            edges_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            pipeline_ref TEXT NOT NULL,
            pipeline_version_ref TEXT NOT NULL,
            status TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            agent_group TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 0,
            retry_strategy TEXT NOT NULL DEFAULT 'fixed',
            leased_by TEXT,
            leased_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS jobs_status_idx ON jobs(status, priority DESC, created_at ASC)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS pipeline_runs (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(id),
            status TEXT NOT NULL,
            records_in INTEGER NOT NULL DEFAULT 0,
            records_out INTEGER NOT NULL DEFAULT 0,
            records_failed INTEGER NOT NULL DEFAULT 0,
            bytes_processed INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            failed_step_ref TEXT,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS step_runs (
            id TEXT PRIMARY KEY,
            pipeline_run_id TEXT NOT NULL REFERENCES pipeline_runs(id),
            node_id TEXT NOT NULL,
            state TEXT NOT NULL,
            records_in INTEGER NOT NULL DEFAULT 0,
            records_out INTEGER NOT NULL DEFAULT 0,
            records_filtered INTEGER NOT NULL DEFAULT 0,
            records_error INTEGER NOT NULL DEFAULT 0,
            bytes_processed INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            error_type TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS watermarks (
            pipeline_version_id TEXT NOT NULL,
            node_id TEXT NOT NULL,
            asset_id TEXT NOT NULL,
            value_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (pipeline_version_id, node_id, asset_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            client_id TEXT NOT NULL UNIQUE,
            hashed_secret TEXT NOT NULL,
            display_name TEXT NOT NULL,
            groups_json TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'online',
            last_heartbeat_at TEXT,
            ip_address TEXT,
            version TEXT,
            system_info_json TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS ephemeral_jobs (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            connection_id TEXT,
            agent_group TEXT NOT NULL DEFAULT 'default',
            payload_json TEXT NOT NULL,
            status TEXT NOT NULL,
            leased_by TEXT,
            leased_at TEXT,
            result_json TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    tracing::info!("control plane schema verified");
    Ok(())
}
