//! `validate` (data contract): per-chunk schema-drift check on the
//! first chunk, then row-level rule evaluation producing a quarantine mask,
//! then cumulative error-rate thresholds. Quarantined rows are left in the
//! output stream enriched with `__synqx_quarantine_reason__` /
//! `__synqx_quarantine_at__`; a downstream edge router distinguishes valid
//! from quarantined rows by the presence of the reason column — this crate
//! has no node-to-node routing concept of its own, so the split into a
//! dedicated quarantine asset is an executor-level concern.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, rows_to_batch, stream_map};

const REASON_COLUMN: &str = "__synqx_quarantine_reason__";
const AT_COLUMN: &str = "__synqx_quarantine_at__";

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Check {
    NotNull,
    Unique,
    MinValue,
    MaxValue,
    Regex,
    InList,
    DataType,
}

#[derive(Debug, Deserialize)]
struct Rule {
    column: String,
    check: Check,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde(default)]
    in_list: Option<Vec<Value>>,
    #[serde(default)]
    data_type: Option<String>,
}

impl Rule {
    fn token(&self) -> String {
        format!("{}:{}", self.column, check_name(self.check))
    }
}

fn check_name(check: Check) -> &'static str {
    match check {
        Check::NotNull => "not_null",
        Check::Unique => "unique",
        Check::MinValue => "min_value",
        Check::MaxValue => "max_value",
        Check::Regex => "regex",
        Check::InList => "in_list",
        Check::DataType => "data_type",
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Deserialize)]
struct ValidateConfig {
    rules: Vec<Rule>,
    #[serde(default)]
    expected_columns: Option<Vec<String>>,
    #[serde(default)]
    strict: bool,
    #[serde(default = "default_true")]
    allow_extra_columns: bool,
    #[serde(default)]
    error_threshold_percent: Option<f64>,
    #[serde(default)]
    error_threshold_rows: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn check_schema_drift(cfg: &ValidateConfig, actual: &[String]) -> OperatorResult<()> {
    let Some(expected) = &cfg.expected_columns else {
        return Ok(());
    };
    let actual_set: HashSet<&String> = actual.iter().collect();
    let expected_set: HashSet<&String> = expected.iter().collect();
    let missing: Vec<&String> = expected_set.difference(&actual_set).copied().collect();
    let extra: Vec<&String> = actual_set.difference(&expected_set).copied().collect();

    if !missing.is_empty() {
        return Err(OperatorError::Other(format!("validate: missing expected columns {missing:?}")));
    }
    if !extra.is_empty() && (cfg.strict || !cfg.allow_extra_columns) {
        return Err(OperatorError::Other(format!("validate: unexpected columns {extra:?}")));
    }
    Ok(())
}

fn rule_fails(rule: &Rule, row: &Map<String, Value>, seen_in_chunk: &mut HashSet<String>) -> bool {
    let value = row.get(&rule.column).unwrap_or(&Value::Null);
    if matches!(rule.check, Check::NotNull) {
        return value.is_null();
    }
    if value.is_null() {
        return false; // absent values don't trip the other checks; not_null already covers nullness
    }
    match rule.check {
        Check::NotNull => unreachable!("handled above"),
        Check::Unique => {
            let key = serde_json::to_string(value).expect("Value serialization never fails");
            !seen_in_chunk.insert(key)
        }
        Check::MinValue => match (value.as_f64(), rule.min_value) {
            (Some(v), Some(min)) => v < min,
            _ => false,
        },
        Check::MaxValue => match (value.as_f64(), rule.max_value) {
            (Some(v), Some(max)) => v > max,
            _ => false,
        },
        Check::Regex => match (&rule.pattern, value.as_str()) {
            (Some(pattern), Some(s)) => match regex::Regex::new(pattern) {
                Ok(re) => !re.is_match(s),
                Err(_) => true,
            },
            _ => false,
        },
        Check::InList => match &rule.in_list {
            Some(list) => !list.contains(value),
            None => false,
        },
        Check::DataType => match &rule.data_type {
            Some(expected) => value_type_name(value) != expected,
            None => false,
        },
    }
}

pub struct ValidateOperator;

impl ValidateOperator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ValidateOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for ValidateOperator {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn validate_config(&self, config: &serde_json::Value) -> OperatorResult<()> {
        let cfg: ValidateConfig = parse_config(self.name(), config)?;
        if cfg.rules.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "rules must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &serde_json::Value) -> OperatorResult<ChunkStream> {
        let cfg: ValidateConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let cfg = Arc::new(cfg);
        let schema_checked = Arc::new(AtomicBool::new(false));
        let rows_processed = Arc::new(AtomicU64::new(0));
        let rows_failed = Arc::new(AtomicU64::new(0));

        Ok(stream_map(input, move |chunk| {
            if !schema_checked.swap(true, Ordering::SeqCst) {
                let actual: Vec<String> = chunk.schema().fields().iter().map(|f| f.name().clone()).collect();
                check_schema_drift(&cfg, &actual)?;
            }

            let mut seen_per_column: std::collections::HashMap<String, HashSet<String>> = std::collections::HashMap::new();
            let now = Value::from(Utc::now().to_rfc3339());
            let mut rows = batch_to_rows(chunk.record_batch());

            let mut chunk_failed = 0u64;
            for row in rows.iter_mut() {
                let mut tokens = Vec::new();
                for rule in &cfg.rules {
                    let seen = seen_per_column.entry(rule.column.clone()).or_default();
                    if rule_fails(rule, row, seen) {
                        tokens.push(rule.token());
                    }
                }
                if !tokens.is_empty() {
                    row.insert(REASON_COLUMN.to_string(), Value::from(tokens.join(";")));
                    row.insert(AT_COLUMN.to_string(), now.clone());
                    chunk_failed += 1;
                }
            }

            let processed = rows_processed.fetch_add(rows.len() as u64, Ordering::SeqCst) + rows.len() as u64;
            let failed = rows_failed.fetch_add(chunk_failed, Ordering::SeqCst) + chunk_failed;

            if let Some(max_rows) = cfg.error_threshold_rows {
                if failed > max_rows {
                    return Err(OperatorError::Other(format!(
                        "validate: error_threshold_rows exceeded ({failed} > {max_rows})"
                    )));
                }
            }
            if let Some(max_percent) = cfg.error_threshold_percent {
                let percent = if processed == 0 { 0.0 } else { (failed as f64 / processed as f64) * 100.0 };
                if percent > max_percent {
                    return Err(OperatorError::Other(format!(
                        "validate: error_threshold_percent exceeded ({percent:.2}% > {max_percent}%)"
                    )));
                }
            }

            // Always carry the two quarantine columns so every chunk this operator
            // emits shares one schema, whether or not this particular chunk had
            // any failing rows.
            let mut schema_fields: Vec<arrow::datatypes::Field> = chunk.schema().fields().iter().map(|f| f.as_ref().clone()).collect();
            schema_fields.push(arrow::datatypes::Field::new(REASON_COLUMN, arrow::datatypes::DataType::Utf8, true));
            schema_fields.push(arrow::datatypes::Field::new(AT_COLUMN, arrow::datatypes::DataType::Utf8, true));
            let schema = Arc::new(arrow::datatypes::Schema::new(schema_fields));
            Ok(Chunk::new(rows_to_batch(schema, &rows)?))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};

    fn email_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("e", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])),
                Arc::new(StringArray::from(vec![Some("a@x"), None, Some("b@y"), Some("not-an-email"), Some("c@z")])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn quarantines_failing_rows_and_continues_under_threshold() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(email_batch()))]));
        let config = serde_json::json!({
            "rules": [
                { "column": "e", "check": "not_null" },
                { "column": "e", "check": "regex", "pattern": "^.+@.+$" },
            ],
            "error_threshold_percent": 50,
        });
        let out = ValidateOperator::new().transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let batch = chunks[0].as_ref().unwrap().record_batch();
        let reasons = batch.column(batch.schema().index_of(REASON_COLUMN).unwrap());
        let reasons = reasons.as_any().downcast_ref::<StringArray>().unwrap();

        let valid = (0..reasons.len()).filter(|&i| reasons.is_null(i)).count();
        let quarantined = (0..reasons.len()).filter(|&i| !reasons.is_null(i)).count();
        assert_eq!(valid, 3);
        assert_eq!(quarantined, 2);
        assert_eq!(reasons.value(1), "e:not_null");
        assert_eq!(reasons.value(3), "e:regex");
    }

    #[tokio::test]
    async fn breach_of_error_threshold_fails_the_chunk() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(email_batch()))]));
        let config = serde_json::json!({
            "rules": [{ "column": "e", "check": "not_null" }],
            "error_threshold_rows": 0,
        });
        let out = ValidateOperator::new().transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        assert!(chunks[0].is_err());
    }
}
