//! `filter`: keeps rows matching a predicate, drops the rest. Pushdown
//! candidate: a chain of `filter`/`limit_offset` nodes
//! directly downstream of an `extract` node gets folded into the source
//! query instead of running here, via `synqx_dag::pushdown`. This operator
//! is always correct to run even when pushdown already handled it upstream
//! — the predicate is idempotent.

use std::collections::HashMap;

use arrow::array::{Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Int64Array, StringArray};
use arrow::compute::{and, filter_record_batch};
use arrow::datatypes::DataType;
use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::util::stream_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
struct Condition {
    column: String,
    op: CompareOp,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct FilterConfig {
    predicate: String,
}

/// Parses a tiny `column op literal (AND column op literal)*` grammar.
/// No OR, no parentheses, no nested expressions — enough to express the
/// predicates the DAG optimizer's pushdown already restricts itself to.
fn parse_predicate(expr: &str) -> OperatorResult<Vec<Condition>> {
    let mut conditions = Vec::new();
    for clause in split_and(expr) {
        conditions.push(parse_condition(clause.trim())?);
    }
    if conditions.is_empty() {
        return Err(OperatorError::InvalidConfig {
            operator: "filter".to_string(),
            reason: "predicate parsed to zero conditions".to_string(),
        });
    }
    Ok(conditions)
}

fn split_and(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = expr;
    loop {
        if let Some(idx) = find_and(rest) {
            parts.push(&rest[..idx]);
            rest = &rest[idx + 5..];
        } else {
            parts.push(rest);
            break;
        }
    }
    parts
}

fn find_and(s: &str) -> Option<usize> {
    let lower = s.to_ascii_lowercase();
    lower.find(" and ")
}

fn parse_condition(clause: &str) -> OperatorResult<Condition> {
    const OPS: &[(&str, CompareOp)] = &[
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("=", CompareOp::Eq),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];
    for (token, op) in OPS {
        if let Some(idx) = clause.find(token) {
            let column = clause[..idx].trim().to_string();
            let raw = clause[idx + token.len()..].trim();
            let value = parse_literal(raw);
            return Ok(Condition { column, op: *op, value });
        }
    }
    Err(OperatorError::InvalidConfig {
        operator: "filter".to_string(),
        reason: format!("could not parse condition '{clause}'"),
    })
}

fn parse_literal(raw: &str) -> Value {
    let trimmed = raw.trim();
    if (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
    {
        return Value::from(trimmed[1..trimmed.len() - 1].to_string());
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::from(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::from(false);
    }
    if trimmed.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::from(f);
    }
    Value::from(trimmed.to_string())
}

fn eval_condition(array: &ArrayRef, cond: &Condition) -> OperatorResult<BooleanArray> {
    match array.data_type() {
        DataType::Int64 => {
            let scalar = cond.value.as_i64().ok_or_else(|| type_mismatch(&cond.column, "int64"))?;
            let arr = array.as_any().downcast_ref::<Int64Array>().unwrap();
            Ok(mask(arr.len(), cond.op, |i| arr.is_null(i), |i| compare(arr.value(i), scalar, cond.op)))
        }
        DataType::Float64 => {
            let scalar = cond.value.as_f64().ok_or_else(|| type_mismatch(&cond.column, "float64"))?;
            let arr = array.as_any().downcast_ref::<Float64Array>().unwrap();
            Ok(mask(arr.len(), cond.op, |i| arr.is_null(i), |i| compare(arr.value(i), scalar, cond.op)))
        }
        DataType::Utf8 => {
            let scalar = cond.value.as_str().ok_or_else(|| type_mismatch(&cond.column, "utf8"))?;
            let arr = array.as_any().downcast_ref::<StringArray>().unwrap();
            Ok(mask(arr.len(), cond.op, |i| arr.is_null(i), |i| compare_str(arr.value(i), scalar, cond.op)))
        }
        other => Err(OperatorError::Other(format!(
            "filter: unsupported column type {other:?} for '{}'",
            cond.column
        ))),
    }
}

fn type_mismatch(column: &str, expected: &str) -> OperatorError {
    OperatorError::InvalidConfig {
        operator: "filter".to_string(),
        reason: format!("column '{column}' is {expected} but predicate literal did not match"),
    }
}

fn compare<T: PartialOrd>(lhs: T, rhs: T, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => lhs == rhs,
        CompareOp::Ne => lhs != rhs,
        CompareOp::Lt => lhs < rhs,
        CompareOp::Le => lhs <= rhs,
        CompareOp::Gt => lhs > rhs,
        CompareOp::Ge => lhs >= rhs,
    }
}

fn compare_str(lhs: &str, rhs: &str, op: CompareOp) -> bool {
    compare(lhs, rhs, op)
}

/// Nulls never satisfy any predicate, matching SQL three-valued-logic
/// WHERE semantics rather than Rust's `None == None`.
fn mask(len: usize, _op: CompareOp, is_null: impl Fn(usize) -> bool, eval: impl Fn(usize) -> bool) -> BooleanArray {
    let mut builder = BooleanBuilder::with_capacity(len);
    for i in 0..len {
        if is_null(i) {
            builder.append_value(false);
        } else {
            builder.append_value(eval(i));
        }
    }
    builder.finish()
}

pub struct FilterOperator;

impl Operator for FilterOperator {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: FilterConfig = serde_json::from_value(config.clone()).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        parse_predicate(&cfg.predicate)?;
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: FilterConfig = serde_json::from_value(config.clone()).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let conditions = parse_predicate(&cfg.predicate)?;

        Ok(stream_map(input, move |chunk: Chunk| {
            let batch = chunk.record_batch();
            let schema = batch.schema();
            let mut combined: Option<BooleanArray> = None;
            for cond in &conditions {
                let idx = schema.index_of(&cond.column).map_err(|_| OperatorError::InvalidConfig {
                    operator: "filter".to_string(),
                    reason: format!("unknown column '{}'", cond.column),
                })?;
                let col_mask = eval_condition(batch.column(idx), cond)?;
                combined = Some(match combined {
                    Some(acc) => and(&acc, &col_mask)?,
                    None => col_mask,
                });
            }
            let mask = combined.unwrap_or_else(|| BooleanArray::from(vec![true; batch.num_rows()]));
            let filtered = filter_record_batch(batch, &mask)?;
            Ok(Chunk::new(filtered))
        }))
    }

    fn lineage_map(
        &self,
        input_columns: &[String],
        _config: &Value,
    ) -> HashMap<String, std::collections::HashSet<String>> {
        input_columns
            .iter()
            .map(|c| (c.clone(), std::collections::HashSet::from([c.clone()])))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_condition() {
        let conds = parse_predicate("amount > 100").unwrap();
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].column, "amount");
        assert_eq!(conds[0].op, CompareOp::Gt);
        assert_eq!(conds[0].value, Value::from(100));
    }

    #[test]
    fn parses_conjunction_of_conditions() {
        let conds = parse_predicate("amount > 100 AND status = 'active'").unwrap();
        assert_eq!(conds.len(), 2);
        assert_eq!(conds[1].column, "status");
        assert_eq!(conds[1].value, Value::from("active"));
    }

    #[tokio::test]
    async fn transform_keeps_only_matching_rows() {
        use arrow::array::RecordBatch;
        use arrow::datatypes::{DataType as Dt, Field, Schema};
        use futures::stream::{self, StreamExt};
        use std::sync::Arc;

        let schema = Arc::new(Schema::new(vec![Field::new("amount", Dt::Int64, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![50, 150, 200]))]).unwrap();
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch))]));

        let config = serde_json::json!({ "predicate": "amount > 100" });
        let out = FilterOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().num_rows(), 2);
    }
}
