//! Graph model and static optimizer for pipeline DAGs.
//!
//! A `Dag` is built fresh from a `PipelineVersion`'s flat node/edge lists
//! every time the executor needs to schedule a run; nothing here is
//! persisted. The optimizer operates on a cloned `PipelinePlan` and never
//! mutates the version's canonical stored form.

pub mod graph;
pub mod optimizer;
pub mod pushdown;

pub use graph::{Dag, DagError, NodeId};

#[cfg(test)]
mod tests {
    use super::*;
    use synqx_ids::NodeId as IdsNodeId;

    #[test]
    fn reexported_node_id_matches_ids_crate() {
        let a: NodeId = IdsNodeId::new("x");
        assert_eq!(a.as_str(), "x");
    }
}
