//! Adjacency-list DAG over a pipeline version's nodes and edges, with
//! Kahn's-algorithm topological ordering and layer peeling for
//! maximum-parallelism scheduling.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use synqx_ids::NodeId;
use synqx_protocol::types::{Edge, Node, PipelineVersion};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("node {0} already present in this DAG")]
    DuplicateNode(NodeId),
    #[error("edge references unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("self-loop on node {0} is not allowed")]
    SelfLoop(NodeId),
    #[error("cycle detected, involving at least node {0}")]
    CycleDetected(NodeId),
}

/// A directed acyclic graph of pipeline nodes, built fresh per scheduling
/// pass. Nodes carry no payload here beyond their id; callers look the
/// full `Node`/`Edge` data up by id in the `PipelineVersion` they built
/// this graph from.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    nodes: HashSet<NodeId>,
    forward: HashMap<NodeId, Vec<NodeId>>,
    backward: HashMap<NodeId, Vec<NodeId>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `Dag` from a pipeline version's flat node/edge lists.
    /// Rejects self-loops and duplicate node ids outright; cycles are only
    /// detected once `topological_sort`/`execution_layers` is called,
    /// since Kahn's algorithm is the natural place to discover them.
    pub fn from_version(version: &PipelineVersion) -> Result<Self, DagError> {
        let mut dag = Self::new();
        for node in &version.nodes {
            dag.add_node(node.node_id.clone())?;
        }
        for edge in &version.edges {
            dag.add_edge(edge.from_node_id.clone(), edge.to_node_id.clone())?;
        }
        Ok(dag)
    }

    pub fn add_node(&mut self, id: NodeId) -> Result<(), DagError> {
        if self.nodes.contains(&id) {
            return Err(DagError::DuplicateNode(id));
        }
        self.nodes.insert(id.clone());
        self.forward.entry(id.clone()).or_default();
        self.backward.entry(id).or_default();
        Ok(())
    }

    /// Adds an edge. Idempotent: adding the same edge twice is a no-op,
    /// not an error (two `Edge` rows between the same pair are redundant,
    /// not contradictory).
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), DagError> {
        if from == to {
            return Err(DagError::SelfLoop(from));
        }
        if !self.nodes.contains(&from) {
            return Err(DagError::UnknownNode(from));
        }
        if !self.nodes.contains(&to) {
            return Err(DagError::UnknownNode(to));
        }
        let out = self.forward.entry(from.clone()).or_default();
        if !out.contains(&to) {
            out.push(to.clone());
        }
        let inn = self.backward.entry(to).or_default();
        if !inn.contains(&from) {
            inn.push(from);
        }
        Ok(())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn successors(&self, id: &NodeId) -> &[NodeId] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: &NodeId) -> &[NodeId] {
        self.backward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A stable topological order via Kahn's algorithm. Ties (nodes that
    /// become ready in the same pass) break by `NodeId` ordering so the
    /// result is deterministic across runs of the same DAG.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, DagError> {
        let mut indegree: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .map(|n| (n.clone(), self.backward.get(n).map(Vec::len).unwrap_or(0)))
            .collect();

        let mut ready: Vec<NodeId> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(n, _)| n.clone())
            .collect();
        ready.sort();
        let mut queue: VecDeque<NodeId> = ready.into();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = queue.pop_front() {
            order.push(next.clone());
            let mut newly_ready = Vec::new();
            for succ in self.successors(&next) {
                if let Some(deg) = indegree.get_mut(succ) {
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(succ.clone());
                    }
                }
            }
            newly_ready.sort();
            for n in newly_ready {
                queue.push_back(n);
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = self
                .nodes
                .iter()
                .find(|n| !order.contains(n))
                .cloned()
                .expect("order is strictly smaller than nodes, so a missing node exists");
            return Err(DagError::CycleDetected(stuck));
        }
        Ok(order)
    }

    /// Groups nodes into layers such that layer N's nodes depend only on
    /// nodes in layers `< N`. The executor runs every node in a layer
    /// concurrently before moving to the next layer (bounded by its own
    /// worker-pool semaphore).
    pub fn execution_layers(&self) -> Result<Vec<Vec<NodeId>>, DagError> {
        let mut remaining: HashSet<NodeId> = self.nodes.clone();
        let mut indegree: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .map(|n| (n.clone(), self.backward.get(n).map(Vec::len).unwrap_or(0)))
            .collect();

        let mut layers = Vec::new();
        while !remaining.is_empty() {
            let mut layer: Vec<NodeId> = remaining
                .iter()
                .filter(|n| indegree.get(*n).copied().unwrap_or(0) == 0)
                .cloned()
                .collect();
            if layer.is_empty() {
                let stuck = remaining
                    .iter()
                    .next()
                    .cloned()
                    .expect("remaining is non-empty here");
                return Err(DagError::CycleDetected(stuck));
            }
            layer.sort();
            for n in &layer {
                remaining.remove(n);
                for succ in self.successors(n) {
                    if let Some(deg) = indegree.get_mut(succ) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }
            layers.push(layer);
        }
        Ok(layers)
    }
}

/// A cloneable, mutable view of a pipeline version that the optimizer
/// rewrites in place (e.g. collapsing a filter into an upstream extract).
/// Distinct from `PipelineVersion` so optimizer passes never touch the
/// canonical stored version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl From<&PipelineVersion> for PipelinePlan {
    fn from(version: &PipelineVersion) -> Self {
        Self {
            nodes: version.nodes.clone(),
            edges: version.edges.clone(),
        }
    }
}

impl PipelinePlan {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.node_id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.node_id == id)
    }

    pub fn remove_node(&mut self, id: &NodeId) {
        self.nodes.retain(|n| &n.node_id != id);
        self.edges
            .retain(|e| &e.from_node_id != id && &e.to_node_id != id);
    }

    pub fn to_dag(&self) -> Result<Dag, DagError> {
        let mut dag = Dag::new();
        for node in &self.nodes {
            dag.add_node(node.node_id.clone())?;
        }
        for edge in &self.edges {
            dag.add_edge(edge.from_node_id.clone(), edge.to_node_id.clone())?;
        }
        Ok(dag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(pairs: &[(&str, &str)]) -> Dag {
        let mut dag = Dag::new();
        let mut seen = HashSet::new();
        for (a, b) in pairs {
            for n in [a, b] {
                let id = NodeId::new(*n);
                if seen.insert(id.clone()) {
                    dag.add_node(id).unwrap();
                }
            }
        }
        for (a, b) in pairs {
            dag.add_edge(NodeId::new(*a), NodeId::new(*b)).unwrap();
        }
        dag
    }

    #[test]
    fn topological_sort_respects_dependency_order() {
        let dag = chain(&[("extract", "filter"), ("filter", "load")]);
        let order = dag.topological_sort().unwrap();
        assert_eq!(
            order,
            vec![
                NodeId::new("extract"),
                NodeId::new("filter"),
                NodeId::new("load")
            ]
        );
    }

    #[test]
    fn execution_layers_group_independent_nodes() {
        let dag = chain(&[("extract", "filter_a"), ("extract", "filter_b")]);
        let layers = dag.execution_layers().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0], vec![NodeId::new("extract")]);
        assert_eq!(
            layers[1],
            vec![NodeId::new("filter_a"), NodeId::new("filter_b")]
        );
    }

    #[test]
    fn self_loop_is_rejected() {
        let mut dag = Dag::new();
        dag.add_node(NodeId::new("a")).unwrap();
        let err = dag.add_edge(NodeId::new("a"), NodeId::new("a")).unwrap_err();
        assert_eq!(err, DagError::SelfLoop(NodeId::new("a")));
    }

    #[test]
    fn duplicate_edges_are_idempotent() {
        let mut dag = Dag::new();
        dag.add_node(NodeId::new("a")).unwrap();
        dag.add_node(NodeId::new("b")).unwrap();
        dag.add_edge(NodeId::new("a"), NodeId::new("b")).unwrap();
        dag.add_edge(NodeId::new("a"), NodeId::new("b")).unwrap();
        assert_eq!(dag.successors(&NodeId::new("a")).len(), 1);
    }

    #[test]
    fn cycle_is_detected_by_topological_sort() {
        let mut dag = Dag::new();
        dag.add_node(NodeId::new("a")).unwrap();
        dag.add_node(NodeId::new("b")).unwrap();
        dag.add_edge(NodeId::new("a"), NodeId::new("b")).unwrap();
        dag.add_edge(NodeId::new("b"), NodeId::new("a")).unwrap();
        assert!(matches!(
            dag.topological_sort(),
            Err(DagError::CycleDetected(_))
        ));
    }
}
