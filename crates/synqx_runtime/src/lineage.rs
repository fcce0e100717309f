//! Column-level provenance, composed across a whole plan from each node's
//! local [`Operator::lineage_map`](crate::operator::Operator::lineage_map).
//!
//! Every operator only knows its own input-to-output column mapping; the
//! executor needs the full chain back to source assets so it can persist
//! `StepRun::lineage_map`. Walking the DAG in topological order and
//! substituting each input column for whatever its producer already
//! resolved it to gets there in one forward pass.

use std::collections::{HashMap, HashSet};

use synqx_dag::graph::Dag;
use synqx_ids::NodeId;

pub type ColumnLineage = HashMap<String, HashSet<String>>;

/// Composes per-node local lineage maps into full provenance back to
/// source columns. `topo_order` must be a valid topological order of
/// `dag` (the executor already has one from `Dag::topological_sort`).
/// A node absent from `local_maps` (e.g. collapsed-into another node) is
/// skipped; its successors then trace straight through to its own
/// predecessors' resolved columns, which is also well-defined because we
/// only ever resolve against what's already in `composed`.
pub fn compose(
    topo_order: &[NodeId],
    local_maps: &HashMap<NodeId, ColumnLineage>,
    dag: &Dag,
) -> HashMap<NodeId, ColumnLineage> {
    let mut composed: HashMap<NodeId, ColumnLineage> = HashMap::new();

    for node in topo_order {
        let Some(local) = local_maps.get(node) else {
            continue;
        };
        let preds = dag.predecessors(node);
        let mut node_composed: ColumnLineage = HashMap::new();

        for (out_col, in_cols) in local {
            let mut resolved: HashSet<String> = HashSet::new();
            for in_col in in_cols {
                let mut traced_from_a_predecessor = false;
                for pred in preds {
                    if let Some(pred_cols) = composed.get(pred).and_then(|m| m.get(in_col)) {
                        resolved.extend(pred_cols.iter().cloned());
                        traced_from_a_predecessor = true;
                    }
                }
                if !traced_from_a_predecessor {
                    // No predecessor produced this column under this name:
                    // either `node` has no predecessors (it's a source
                    // extract) or the name is itself a source column.
                    resolved.insert(in_col.clone());
                }
            }
            node_composed.insert(out_col.clone(), resolved);
        }
        composed.insert(node.clone(), node_composed);
    }

    composed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &[&str])]) -> ColumnLineage {
        pairs
            .iter()
            .map(|(out, ins)| (out.to_string(), ins.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn identity_chain_resolves_straight_to_source_columns() {
        let mut dag = Dag::new();
        dag.add_node(NodeId::new("extract")).unwrap();
        dag.add_node(NodeId::new("filter")).unwrap();
        dag.add_edge(NodeId::new("extract"), NodeId::new("filter")).unwrap();

        let mut local = HashMap::new();
        local.insert(NodeId::new("extract"), map(&[("id", &["id"]), ("name", &["name"])]));
        local.insert(NodeId::new("filter"), map(&[("id", &["id"]), ("name", &["name"])]));

        let order = vec![NodeId::new("extract"), NodeId::new("filter")];
        let composed = compose(&order, &local, &dag);
        assert_eq!(
            composed[&NodeId::new("filter")]["id"],
            HashSet::from(["id".to_string()])
        );
    }

    #[test]
    fn rename_is_resolved_through_the_chain() {
        let mut dag = Dag::new();
        dag.add_node(NodeId::new("extract")).unwrap();
        dag.add_node(NodeId::new("rename")).unwrap();
        dag.add_edge(NodeId::new("extract"), NodeId::new("rename")).unwrap();

        let mut local = HashMap::new();
        local.insert(NodeId::new("extract"), map(&[("id", &["id"]), ("email", &["email"])]));
        // rename: email -> user_email
        local.insert(NodeId::new("rename"), map(&[("id", &["id"]), ("user_email", &["email"])]));

        let order = vec![NodeId::new("extract"), NodeId::new("rename")];
        let composed = compose(&order, &local, &dag);
        assert_eq!(
            composed[&NodeId::new("rename")]["user_email"],
            HashSet::from(["email".to_string()])
        );
    }

    #[test]
    fn join_merges_lineage_from_both_parents() {
        let mut dag = Dag::new();
        for n in ["left", "right", "join"] {
            dag.add_node(NodeId::new(n)).unwrap();
        }
        dag.add_edge(NodeId::new("left"), NodeId::new("join")).unwrap();
        dag.add_edge(NodeId::new("right"), NodeId::new("join")).unwrap();

        let mut local = HashMap::new();
        local.insert(NodeId::new("left"), map(&[("id", &["id"]), ("amount", &["amount"])]));
        local.insert(NodeId::new("right"), map(&[("id", &["id"]), ("category", &["category"])]));
        local.insert(
            NodeId::new("join"),
            map(&[("id", &["id"]), ("amount", &["amount"]), ("category", &["category"])]),
        );

        let order = vec![NodeId::new("left"), NodeId::new("right"), NodeId::new("join")];
        let composed = compose(&order, &local, &dag);
        assert_eq!(composed[&NodeId::new("join")]["amount"], HashSet::from(["amount".to_string()]));
        assert_eq!(composed[&NodeId::new("join")]["category"], HashSet::from(["category".to_string()]));
    }

    #[test]
    fn collapsed_node_missing_from_local_maps_is_skipped() {
        let mut dag = Dag::new();
        dag.add_node(NodeId::new("extract")).unwrap();
        dag.add_node(NodeId::new("load")).unwrap();
        dag.add_edge(NodeId::new("extract"), NodeId::new("load")).unwrap();

        let mut local = HashMap::new();
        local.insert(NodeId::new("load"), map(&[("id", &["id"])]));
        let order = vec![NodeId::new("extract"), NodeId::new("load")];
        let composed = compose(&order, &local, &dag);
        assert!(!composed.contains_key(&NodeId::new("extract")));
        assert_eq!(composed[&NodeId::new("load")]["id"], HashSet::from(["id".to_string()]));
    }
}
