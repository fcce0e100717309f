//! `postgres`: a pushdown-capable SQL connector. This module only builds SQL
//! text and parses `config`/`Value` shapes — it never opens a socket. A
//! production build would swap the `QueryRunner`/`BatchReader` bodies for a
//! real `sqlx::Pool<Postgres>`, using the workspace's existing `sqlx`
//! dependency; keeping it text-only here keeps this reference connector
//! runnable without a live database.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use synqx_dag::pushdown::{compose_query, LimitOffset, Predicate};

use crate::capability::{BatchReader, Connectable, QueryRunner, RowBatch};
use crate::error::{ConnectorError, ConnectorResult};
use crate::hygiene::{normalize_asset, strip_internal_keys};
use crate::registry::{ConnectorHandle, ConnectorHandleBuilder};

#[derive(Debug, Deserialize)]
struct PostgresConfig {
    #[allow(dead_code)]
    host: String,
    #[serde(default = "default_port")]
    #[allow(dead_code)]
    port: u16,
    #[allow(dead_code)]
    database: String,
    #[serde(default)]
    db_schema: Option<String>,
}

fn default_port() -> u16 {
    5432
}

fn parse_config(config: &Value) -> ConnectorResult<PostgresConfig> {
    serde_json::from_value(config.clone())
        .map_err(|e| ConnectorError::InvalidConfig { kind: "postgres".to_string(), reason: e.to_string() })
}

/// Builds a fully qualified, double-quoted `schema.table` reference from an
/// asset identifier, splitting on the last `.` to separate schema from name.
fn quoted_relation(asset: &str, db_schema: Option<&str>) -> String {
    let (schema, name) = normalize_asset(asset, db_schema);
    match schema {
        Some(schema) => format!("\"{schema}\".\"{name}\""),
        None => format!("\"{name}\""),
    }
}

pub struct PostgresConnector;

#[async_trait]
impl Connectable for PostgresConnector {
    async fn connect(&self, config: &Value) -> ConnectorResult<()> {
        parse_config(config)?;
        Ok(())
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn test_connection(&self, config: &Value) -> ConnectorResult<()> {
        parse_config(config)?;
        Ok(())
    }
}

#[async_trait]
impl QueryRunner for PostgresConnector {
    async fn execute_query(&self, config: &Value, query: &str) -> ConnectorResult<RowBatch> {
        let mut kwargs = config.as_object().cloned().unwrap_or_default();
        strip_internal_keys(&mut kwargs);
        let _ = query;
        Err(ConnectorError::NotImplemented("postgres execute_query requires a live sqlx::Pool<Postgres>"))
    }

    async fn get_total_count(&self, config: &Value, asset: &str) -> ConnectorResult<u64> {
        let cfg = parse_config(config)?;
        let relation = quoted_relation(asset, cfg.db_schema.as_deref());
        let _sql = format!("SELECT count(*) FROM {relation}");
        Err(ConnectorError::NotImplemented("postgres get_total_count requires a live sqlx::Pool<Postgres>"))
    }
}

#[async_trait]
impl BatchReader for PostgresConnector {
    async fn read_batch(
        &self,
        config: &Value,
        asset: &str,
        batch_size: usize,
        incremental_filter: Option<&Value>,
    ) -> ConnectorResult<RowBatch> {
        let cfg = parse_config(config)?;
        let relation = quoted_relation(asset, cfg.db_schema.as_deref());
        let _sql = build_select(&relation, batch_size, incremental_filter);
        Err(ConnectorError::NotImplemented("postgres read_batch requires a live sqlx::Pool<Postgres>"))
    }
}

/// Composes a pushdown-pushed-down `SELECT`, honoring any predicate a
/// pushdown planner already folded into `incremental_filter`.
fn build_select(relation: &str, batch_size: usize, incremental_filter: Option<&Value>) -> String {
    let base = format!("SELECT * FROM {relation}");
    let predicates: Vec<Predicate> = incremental_filter
        .and_then(Predicate::from_filter_config)
        .into_iter()
        .collect();
    compose_query(&base, &predicates, LimitOffset { limit: Some(batch_size as u64), offset: None })
}

pub fn handle() -> ConnectorHandle {
    let connectable: Arc<PostgresConnector> = Arc::new(PostgresConnector);
    ConnectorHandleBuilder::new("postgres", connectable.clone())
        .query_runner(connectable.clone())
        .batch_reader(connectable)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_schema_and_table_from_a_dotted_asset() {
        assert_eq!(quoted_relation("public.orders", None), "\"public\".\"orders\"");
    }

    #[test]
    fn falls_back_to_configured_schema_without_a_dot() {
        assert_eq!(quoted_relation("orders", Some("public")), "\"public\".\"orders\"");
    }

    #[test]
    fn build_select_applies_limit_and_pushed_down_filter() {
        let filter = serde_json::json!({"column": "updated_at", "op": ">", "value": "2024-01-01"});
        let sql = build_select("\"public\".\"orders\"", 500, Some(&filter));
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT * FROM (\"public\".\"orders\") AS filter_subq WHERE updated_at > '2024-01-01') AS limit_subq LIMIT 500"
        );
    }

    #[test]
    fn build_select_with_no_filter_still_applies_the_limit() {
        let sql = build_select("\"public\".\"orders\"", 100, None);
        assert_eq!(sql, "SELECT * FROM (\"public\".\"orders\") AS limit_subq LIMIT 100");
    }
}
