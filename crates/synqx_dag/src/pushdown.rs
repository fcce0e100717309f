//! Query composition for pushdown: wraps a base extract query in one nested
//! `SELECT * FROM (...) AS ... ` subquery per pushed-down operator, so a
//! `filter`/`limit_offset` operator chain downstream of an EXTRACT node can
//! be folded into the extract's own query instead of running row-by-row in
//! the executor.

use serde_json::Value;

/// One pushed-down predicate, already narrowed to the subset the operator
/// runtime's `filter` config supports: `column <op> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: String,
    pub value: Value,
}

impl Predicate {
    /// Builds a predicate from a `filter` node's config, rewriting the
    /// runtime's `==` comparison operator to SQL's `=` (every other
    /// supported operator — `!=`, `>`, `>=`, `<`, `<=` — is already valid
    /// SQL).
    pub fn from_filter_config(config: &Value) -> Option<Self> {
        let column = config.get("column")?.as_str()?.to_string();
        let raw_op = config.get("op")?.as_str()?;
        let op = if raw_op == "==" { "=".to_string() } else { raw_op.to_string() };
        let value = config.get("value")?.clone();
        Some(Self { column, op, value })
    }

    fn sql_value(&self) -> String {
        match &self.value {
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "NULL".to_string(),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }

    fn to_sql(&self) -> String {
        format!("{} {} {}", self.column, self.op, self.sql_value())
    }
}

/// A pushed-down `limit_offset` node's config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    pub fn from_config(config: &Value) -> Self {
        Self {
            limit: config.get("limit").and_then(Value::as_u64),
            offset: config.get("offset").and_then(Value::as_u64),
        }
    }

    fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }
}

/// Wraps `base_query` in one subquery per pushed-down operator: `predicates`
/// (if any) get their own `filter_subq` shell, then `limit_offset` (if any)
/// wraps that again in a `limit_subq` shell — each operator contributes its
/// own nesting level rather than folding everything into one shell.
/// `base_query` can itself already be a composed query from a prior pushdown
/// pass, so repeated calls nest correctly: `SELECT * FROM (SELECT * FROM
/// (base) AS filter_subq WHERE ...) AS limit_subq LIMIT ...`.
pub fn compose_query(base_query: &str, predicates: &[Predicate], limit_offset: LimitOffset) -> String {
    let mut sql = base_query.to_string();

    if !predicates.is_empty() {
        let clause = predicates
            .iter()
            .map(Predicate::to_sql)
            .collect::<Vec<_>>()
            .join(" AND ");
        sql = format!("SELECT * FROM ({}) AS filter_subq WHERE {}", sql, clause);
    }

    if !limit_offset.is_empty() {
        sql = format!("SELECT * FROM ({}) AS limit_subq", sql);
        if let Some(limit) = limit_offset.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = limit_offset.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
    }

    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn predicate_rewrites_double_equals_to_sql_equals() {
        let config = json!({"column": "status", "op": "==", "value": "active"});
        let predicate = Predicate::from_filter_config(&config).unwrap();
        assert_eq!(predicate.to_sql(), "status = 'active'");
    }

    #[test]
    fn predicate_keeps_other_operators_verbatim() {
        let config = json!({"column": "amount", "op": ">=", "value": 100});
        let predicate = Predicate::from_filter_config(&config).unwrap();
        assert_eq!(predicate.to_sql(), "amount >= 100");
    }

    #[test]
    fn compose_query_wraps_with_filter_and_limit() {
        let predicate = Predicate {
            column: "status".into(),
            op: "=".into(),
            value: json!("active"),
        };
        let limit_offset = LimitOffset { limit: Some(50), offset: Some(10) };
        let sql = compose_query("SELECT * FROM orders", &[predicate], limit_offset);
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT * FROM (SELECT * FROM orders) AS filter_subq WHERE status = 'active') AS limit_subq LIMIT 50 OFFSET 10"
        );
    }

    #[test]
    fn compose_query_is_a_no_op_with_nothing_to_push() {
        let sql = compose_query("SELECT * FROM orders", &[], LimitOffset::default());
        assert_eq!(sql, "SELECT * FROM orders");
    }

    #[test]
    fn compose_query_nests_on_repeated_application() {
        let limit_offset = LimitOffset { limit: Some(10), offset: None };
        let once = compose_query("SELECT * FROM orders", &[], limit_offset);
        let twice = compose_query(&once, &[], LimitOffset { limit: Some(5), offset: None });
        assert!(twice.starts_with("SELECT * FROM (SELECT * FROM (SELECT * FROM orders)"));
    }
}
