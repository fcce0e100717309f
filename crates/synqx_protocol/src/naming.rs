//! Name normalization shared between connectors, the DAG optimizer, and the
//! control plane's catalog.

/// Splits a fully-qualified asset name on its last `.` into
/// `(namespace, leaf)`. An FQN with no dot has no namespace.
///
/// ```
/// assert_eq!(synqx_protocol::naming::normalize_asset("public.orders"), ("public".to_string(), "orders".to_string()));
/// assert_eq!(synqx_protocol::naming::normalize_asset("orders"), (String::new(), "orders".to_string()));
/// ```
pub fn normalize_asset(fqn: &str) -> (String, String) {
    match fqn.rsplit_once('.') {
        Some((namespace, leaf)) => (namespace.to_string(), leaf.to_string()),
        None => (String::new(), fqn.to_string()),
    }
}

/// Lowercase, ASCII-safe slug suitable for a filesystem path segment or a
/// staging table name: non-alphanumeric runs collapse to a single `_`, and
/// leading/trailing separators are trimmed.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_sep = true;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Deterministic output file name for a chunk written under a given
/// `node_id`: `{node_slug}_{sequence:06}.parquet`.
pub fn output_filename(node_id: &str, sequence: u64) -> String {
    format!("{}_{:06}.parquet", slugify(node_id), sequence)
}

/// Staging table name derived from a destination asset's leaf name, scoped
/// to a job so concurrent runs against the same destination never collide.
pub fn staging_table_name(destination_fqn: &str, job_prefix: &str) -> String {
    let (_, leaf) = normalize_asset(destination_fqn);
    format!("_synqx_stage_{}_{}", job_prefix, slugify(&leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_asset_splits_on_last_dot() {
        assert_eq!(
            normalize_asset("warehouse.public.orders"),
            ("warehouse.public".to_string(), "orders".to_string())
        );
    }

    #[test]
    fn normalize_asset_without_dot_has_empty_namespace() {
        assert_eq!(normalize_asset("orders"), (String::new(), "orders".to_string()));
    }

    #[test]
    fn slugify_collapses_separators_and_trims() {
        assert_eq!(slugify("  Orders -- Daily!! "), "orders_daily");
    }

    #[test]
    fn output_filename_is_zero_padded() {
        assert_eq!(output_filename("extract_orders", 3), "extract_orders_000003.parquet");
    }

    #[test]
    fn staging_table_name_uses_leaf_only() {
        let name = staging_table_name("warehouse.public.orders", "ab12cd34");
        assert_eq!(name, "_synqx_stage_ab12cd34_orders");
    }
}
