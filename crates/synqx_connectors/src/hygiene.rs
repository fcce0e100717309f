//! Internal-kwargs hygiene and asset identifier normalization, applied by
//! every connector before it talks to its backend library.

use serde_json::{Map, Value};

/// Pipeline-metadata keys that must never reach a backend library call.
pub const INTERNAL_KEYS: &[&str] = &[
    "ui",
    "connection_id",
    "batch_size",
    "incremental",
    "incremental_filter",
    "watermark_column",
    "table",
    "write_mode",
    "write_strategy",
    "target_table",
    "schema_evolution_policy",
    "chunksize",
    "sync_mode",
    "cdc_config",
];

/// Strips [`INTERNAL_KEYS`] from `kwargs` in place.
pub fn strip_internal_keys(kwargs: &mut Map<String, Value>) {
    for key in INTERNAL_KEYS {
        kwargs.remove(*key);
    }
}

/// Splits `asset` into `(schema, name)` on the last `.`; falls back to
/// `config.db_schema` when `asset` carries no dot. Never quotes or
/// transforms names beyond this split.
pub fn normalize_asset(asset: &str, db_schema: Option<&str>) -> (Option<String>, String) {
    match asset.rfind('.') {
        Some(idx) => (Some(asset[..idx].to_string()), asset[idx + 1..].to_string()),
        None => (db_schema.map(str::to_string), asset.to_string()),
    }
}
