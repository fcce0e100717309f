//! `pii_mask`: per-column masking rules, strategy ∈ `{redact,
//! partial, hash, regex}`. `hash` uses SHA-256.

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, rows_to_batch, stream_map};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Strategy {
    Redact,
    Partial,
    Hash,
    Regex,
}

#[derive(Debug, Deserialize)]
struct MaskRule {
    column: String,
    strategy: Strategy,
    #[serde(default = "default_mask_char")]
    mask_char: char,
    #[serde(default = "default_visible_prefix")]
    visible_prefix: usize,
    #[serde(default = "default_visible_suffix")]
    visible_suffix: usize,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default = "default_replacement")]
    replacement: String,
}

fn default_mask_char() -> char {
    '*'
}

fn default_visible_prefix() -> usize {
    0
}

fn default_visible_suffix() -> usize {
    4
}

fn default_replacement() -> String {
    "***".to_string()
}

#[derive(Debug, Deserialize)]
struct PiiMaskConfig {
    rules: Vec<MaskRule>,
}

fn redact(rule: &MaskRule, s: &str) -> String {
    rule.mask_char.to_string().repeat(s.chars().count())
}

fn partial(rule: &MaskRule, s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let prefix = rule.visible_prefix.min(len);
    let suffix = rule.visible_suffix.min(len.saturating_sub(prefix));
    let masked = len - prefix - suffix;
    let mut out = String::with_capacity(len);
    out.extend(&chars[..prefix]);
    out.extend(std::iter::repeat(rule.mask_char).take(masked));
    out.extend(&chars[len - suffix..]);
    out
}

fn hash(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(digest)
}

fn apply_regex(rule: &MaskRule, s: &str) -> OperatorResult<String> {
    let pattern = rule.pattern.as_deref().ok_or_else(|| OperatorError::InvalidConfig {
        operator: "pii_mask".to_string(),
        reason: format!("column '{}' uses strategy=regex but no pattern was given", rule.column),
    })?;
    let re = regex::Regex::new(pattern).map_err(|e| OperatorError::InvalidConfig {
        operator: "pii_mask".to_string(),
        reason: format!("invalid pattern for column '{}': {e}", rule.column),
    })?;
    Ok(re.replace_all(s, rule.replacement.as_str()).into_owned())
}

fn mask_value(rule: &MaskRule, value: &Value) -> OperatorResult<Value> {
    let Some(s) = value.as_str() else {
        return Ok(value.clone()); // non-string values (including null) pass through untouched
    };
    let masked = match rule.strategy {
        Strategy::Redact => redact(rule, s),
        Strategy::Partial => partial(rule, s),
        Strategy::Hash => hash(s),
        Strategy::Regex => apply_regex(rule, s)?,
    };
    Ok(Value::from(masked))
}

pub struct PiiMaskOperator;

impl Operator for PiiMaskOperator {
    fn name(&self) -> &'static str {
        "pii_mask"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: PiiMaskConfig = parse_config(self.name(), config)?;
        if cfg.rules.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "rules must not be empty".to_string(),
            });
        }
        for rule in &cfg.rules {
            if matches!(rule.strategy, Strategy::Regex) && rule.pattern.is_none() {
                return Err(OperatorError::InvalidConfig {
                    operator: self.name().to_string(),
                    reason: format!("column '{}' uses strategy=regex but no pattern was given", rule.column),
                });
            }
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: PiiMaskConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(stream_map(input, move |chunk| {
            let schema = chunk.schema();
            let mut rows = batch_to_rows(chunk.record_batch());
            for row in rows.iter_mut() {
                for rule in &cfg.rules {
                    if let Some(value) = row.get(&rule.column) {
                        let masked = mask_value(rule, value)?;
                        row.insert(rule.column.clone(), masked);
                    }
                }
            }
            Ok(Chunk::new(rows_to_batch(schema, &rows)?))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("ssn", DataType::Utf8, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["123456789"]))]).unwrap()
    }

    #[tokio::test]
    async fn partial_keeps_only_the_configured_suffix_visible() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch()))]));
        let config = serde_json::json!({ "rules": [{ "column": "ssn", "strategy": "partial", "visible_suffix": 4 }] });
        let out = PiiMaskOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let col = chunks[0].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(col.value(0), "*****6789");
    }

    #[tokio::test]
    async fn hash_strategy_is_deterministic_sha256() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch()))]));
        let config = serde_json::json!({ "rules": [{ "column": "ssn", "strategy": "hash" }] });
        let out = PiiMaskOperator.transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let col = chunks[0].as_ref().unwrap().record_batch().column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(col.value(0), hash("123456789"));
    }
}
