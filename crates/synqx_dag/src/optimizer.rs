//! Static pushdown optimizer: folds a `filter`/`limit_offset` chain
//! immediately downstream of an EXTRACT node into the extract's own query,
//! when the extract's connector kind supports query pushdown.

use std::collections::HashMap;

use synqx_ids::{ConnectionId, NodeId};
use synqx_protocol::types::OperatorType;

use crate::graph::PipelinePlan;
use crate::pushdown::{self, LimitOffset, Predicate};

/// Connector kinds whose `QueryRunner` accepts arbitrary SQL, so wrapping
/// their base query in a pushdown subquery is safe. File-based and
/// API-based connectors are never in this set.
pub const PUSHDOWN_CAPABLE_KINDS: &[&str] = &[
    "postgresql",
    "mysql",
    "mariadb",
    "mssql",
    "snowflake",
    "bigquery",
];

/// Operator classes the optimizer knows how to fold into an upstream
/// extract's query.
const PUSHDOWN_COMPATIBLE_OPS: &[&str] = &["filter", "limit_offset"];

pub struct StaticOptimizer;

impl StaticOptimizer {
    /// Runs the pushdown pass in place over `plan`, given a lookup from a
    /// node's `connection_ref` to that connection's connector kind. Returns
    /// the number of downstream operator nodes that were collapsed.
    pub fn optimize(
        plan: &mut PipelinePlan,
        connector_kind_of: &HashMap<ConnectionId, String>,
    ) -> usize {
        let extract_ids: Vec<NodeId> = plan
            .nodes
            .iter()
            .filter(|n| n.operator_type == OperatorType::Extract)
            .map(|n| n.node_id.clone())
            .collect();

        let mut collapsed_count = 0;
        for extract_id in extract_ids {
            collapsed_count += Self::try_collapse_chain(plan, &extract_id, connector_kind_of);
        }
        collapsed_count
    }

    fn try_collapse_chain(
        plan: &mut PipelinePlan,
        extract_id: &NodeId,
        connector_kind_of: &HashMap<ConnectionId, String>,
    ) -> usize {
        let Some(extract) = plan.node(extract_id) else {
            return 0;
        };
        let Some(connection_ref) = extract.connection_ref.clone() else {
            return 0;
        };
        let Some(kind) = connector_kind_of.get(&connection_ref) else {
            return 0;
        };
        if !PUSHDOWN_CAPABLE_KINDS.contains(&kind.as_str()) {
            return 0;
        }
        let Some(base_query) = extract
            .config
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::to_string)
        else {
            return 0;
        };

        let mut predicates = Vec::new();
        let mut limit_offset = LimitOffset::default();
        let mut collapsed_node_ids = Vec::new();
        let mut cursor = extract_id.clone();

        loop {
            // Pushdown only applies to a strictly linear chain: the
            // current node must have exactly one successor, and that
            // successor must have exactly one predecessor (itself), or
            // folding it would silently drop a fan-out/fan-in dependency.
            let dag = match plan.to_dag() {
                Ok(dag) => dag,
                Err(_) => break,
            };
            let successors = dag.successors(&cursor);
            if successors.len() != 1 {
                break;
            }
            let next_id = successors[0].clone();
            if dag.predecessors(&next_id).len() != 1 {
                break;
            }
            let Some(next_node) = plan.node(&next_id) else {
                break;
            };
            if !PUSHDOWN_COMPATIBLE_OPS.contains(&next_node.operator_class.as_str()) {
                break;
            }

            match next_node.operator_class.as_str() {
                "filter" => {
                    let Some(predicate) = Predicate::from_filter_config(&next_node.config) else {
                        break;
                    };
                    predicates.push(predicate);
                }
                "limit_offset" => {
                    let this_one = LimitOffset::from_config(&next_node.config);
                    limit_offset.limit = this_one.limit.or(limit_offset.limit);
                    limit_offset.offset = this_one.offset.or(limit_offset.offset);
                }
                _ => break,
            }

            collapsed_node_ids.push(next_id.clone());
            cursor = next_id;
        }

        if collapsed_node_ids.is_empty() {
            return 0;
        }

        let composed = pushdown::compose_query(&base_query, &predicates, limit_offset);
        let collapsed_markers: Vec<String> = collapsed_node_ids.iter().map(|n| n.to_string()).collect();

        if let Some(extract_mut) = plan.node_mut(extract_id) {
            if let Some(obj) = extract_mut.config.as_object_mut() {
                obj.insert("query".to_string(), serde_json::Value::String(composed));
                obj.insert(
                    "_collapsed_into".to_string(),
                    serde_json::Value::Array(
                        collapsed_markers
                            .iter()
                            .map(|s| serde_json::Value::String(s.clone()))
                            .collect(),
                    ),
                );
                obj.insert(
                    "_pushdown_operators".to_string(),
                    serde_json::Value::Array(
                        collapsed_node_ids
                            .iter()
                            .filter_map(|id| plan.node(id))
                            .map(|n| serde_json::json!({"node_id": n.node_id.to_string(), "operator_class": n.operator_class, "config": n.config}))
                            .collect(),
                    ),
                );
            }
        }

        // Rewire: extract now points directly at the successor of the last
        // collapsed node (if any), then remove the collapsed nodes.
        let tail_successors: Vec<NodeId> = plan
            .to_dag()
            .ok()
            .map(|dag| dag.successors(&cursor).to_vec())
            .unwrap_or_default();

        for collapsed_id in &collapsed_node_ids {
            plan.remove_node(collapsed_id);
        }
        for successor in tail_successors {
            plan.edges.push(synqx_protocol::types::Edge {
                from_node_id: extract_id.clone(),
                to_node_id: successor,
                edge_type: synqx_protocol::types::EdgeType::DataFlow,
            });
        }

        collapsed_node_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synqx_protocol::types::{Edge, EdgeType, Guardrail, Node, RetryPolicy, SchemaEvolutionPolicy, WriteMode};

    fn extract_node(id: &str, query: &str) -> Node {
        Node {
            node_id: NodeId::new(id),
            operator_type: OperatorType::Extract,
            operator_class: "extract".into(),
            config: serde_json::json!({"query": query}),
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            source_asset_ref: None,
            destination_asset_ref: None,
            connection_ref: Some(ConnectionId::new()),
            guardrails: Vec::<Guardrail>::new(),
            data_contract: None,
            quarantine_asset_ref: None,
            write_strategy: WriteMode::default(),
            schema_evolution_policy: SchemaEvolutionPolicy::default(),
        }
    }

    fn op_node(id: &str, class: &str, config: serde_json::Value) -> Node {
        Node {
            node_id: NodeId::new(id),
            operator_type: OperatorType::Transform,
            operator_class: class.into(),
            config,
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            source_asset_ref: None,
            destination_asset_ref: None,
            connection_ref: None,
            guardrails: Vec::new(),
            data_contract: None,
            quarantine_asset_ref: None,
            write_strategy: WriteMode::default(),
            schema_evolution_policy: SchemaEvolutionPolicy::default(),
        }
    }

    #[test]
    fn collapses_filter_and_limit_into_extract_query() {
        let extract = extract_node("extract", "SELECT * FROM orders");
        let connection_ref = extract.connection_ref.clone().unwrap();
        let filter = op_node("filter", "filter", serde_json::json!({"column": "status", "op": "==", "value": "active"}));
        let limit = op_node("limit", "limit_offset", serde_json::json!({"limit": 100}));
        let load = op_node("load", "load", serde_json::json!({}));

        let mut plan = crate::graph::PipelinePlan {
            nodes: vec![extract.clone(), filter.clone(), limit.clone(), load.clone()],
            edges: vec![
                Edge { from_node_id: extract.node_id.clone(), to_node_id: filter.node_id.clone(), edge_type: EdgeType::DataFlow },
                Edge { from_node_id: filter.node_id.clone(), to_node_id: limit.node_id.clone(), edge_type: EdgeType::DataFlow },
                Edge { from_node_id: limit.node_id.clone(), to_node_id: load.node_id.clone(), edge_type: EdgeType::DataFlow },
            ],
        };

        let mut kinds = HashMap::new();
        kinds.insert(connection_ref, "postgresql".to_string());

        let collapsed = StaticOptimizer::optimize(&mut plan, &kinds);
        assert_eq!(collapsed, 2);
        assert_eq!(plan.nodes.len(), 2);
        let extract_after = plan.node(&NodeId::new("extract")).unwrap();
        let query = extract_after.config.get("query").unwrap().as_str().unwrap();
        assert!(query.contains("status = 'active'"));
        assert!(query.contains("LIMIT 100"));
        let dag = plan.to_dag().unwrap();
        assert_eq!(dag.successors(&NodeId::new("extract")), &[NodeId::new("load")]);
    }

    #[test]
    fn non_pushdown_capable_kind_is_left_untouched() {
        let extract = extract_node("extract", "SELECT * FROM orders");
        let connection_ref = extract.connection_ref.clone().unwrap();
        let filter = op_node("filter", "filter", serde_json::json!({"column": "status", "op": "==", "value": "active"}));
        let mut plan = crate::graph::PipelinePlan {
            nodes: vec![extract.clone(), filter.clone()],
            edges: vec![Edge { from_node_id: extract.node_id.clone(), to_node_id: filter.node_id.clone(), edge_type: EdgeType::DataFlow }],
        };
        let mut kinds = HashMap::new();
        kinds.insert(connection_ref, "object_store".to_string());

        let collapsed = StaticOptimizer::optimize(&mut plan, &kinds);
        assert_eq!(collapsed, 0);
        assert_eq!(plan.nodes.len(), 2);
    }

    #[test]
    fn fan_out_downstream_of_filter_blocks_collapse_past_it() {
        let extract = extract_node("extract", "SELECT * FROM orders");
        let connection_ref = extract.connection_ref.clone().unwrap();
        let filter = op_node("filter", "filter", serde_json::json!({"column": "status", "op": "==", "value": "active"}));
        let load_a = op_node("load_a", "load", serde_json::json!({}));
        let load_b = op_node("load_b", "load", serde_json::json!({}));
        let mut plan = crate::graph::PipelinePlan {
            nodes: vec![extract.clone(), filter.clone(), load_a.clone(), load_b.clone()],
            edges: vec![
                Edge { from_node_id: extract.node_id.clone(), to_node_id: filter.node_id.clone(), edge_type: EdgeType::DataFlow },
                Edge { from_node_id: filter.node_id.clone(), to_node_id: load_a.node_id.clone(), edge_type: EdgeType::DataFlow },
                Edge { from_node_id: filter.node_id.clone(), to_node_id: load_b.node_id.clone(), edge_type: EdgeType::DataFlow },
            ],
        };
        let mut kinds = HashMap::new();
        kinds.insert(connection_ref, "postgresql".to_string());

        let collapsed = StaticOptimizer::optimize(&mut plan, &kinds);
        assert_eq!(collapsed, 1);
        assert_eq!(plan.nodes.len(), 3);
    }
}
