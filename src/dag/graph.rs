// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::model::ConfigFile;
use crate::dag::node::{LogicalNode, NodeIdentifier};
use crate::errors::{Result, RundagError};

/// Internal node structure: the declared node plus its immediate edges.
#[derive(Debug, Clone)]
struct DagNode {
    node: LogicalNode,
    /// Direct predecessors: nodes that must be terminal before this one runs.
    predecessors: Vec<NodeIdentifier>,
    /// Direct successors: nodes that consume this one's results.
    successors: Vec<NodeIdentifier>,
}

/// In-memory DAG keyed by node identifier.
///
/// Edges are checked for cycles when they are added, and the whole graph is
/// re-validated with `petgraph` before each run. Once a run starts the graph
/// is only ever borrowed immutably.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    nodes: HashMap<NodeIdentifier, DagNode>,
    /// Registration order, so iteration is deterministic.
    order: Vec<NodeIdentifier>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a DAG from a validated [`ConfigFile`].
    ///
    /// Assumes that all `after` references are valid and that there are no
    /// cycles; both are guaranteed by `ConfigFile`'s validation.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut dag = Dag::new();

        for node in cfg.logical_nodes() {
            dag.add_node(node);
        }

        for (name, section) in cfg.nodes() {
            let to = NodeIdentifier::from(name.as_str());
            for dep in section.after.iter() {
                dag.connect(&NodeIdentifier::from(dep.as_str()), &to)?;
            }
        }

        Ok(dag)
    }

    /// Register a node. A node whose identifier is already present is ignored.
    pub fn add_node(&mut self, node: LogicalNode) {
        let id = node.identifier().clone();
        if self.nodes.contains_key(&id) {
            debug!(node = %id, "node already registered; ignoring");
            return;
        }
        self.nodes.insert(
            id.clone(),
            DagNode {
                node,
                predecessors: Vec::new(),
                successors: Vec::new(),
            },
        );
        self.order.push(id);
    }

    /// Add the edge `from -> to`, registering either node if it is missing.
    ///
    /// Fails without modifying the graph if the edge would close a cycle.
    pub fn add_edge(&mut self, from: &LogicalNode, to: &LogicalNode) -> Result<()> {
        self.check_edge(from.identifier(), to.identifier())?;
        self.add_node(from.clone());
        self.add_node(to.clone());
        self.insert_edge(from.identifier(), to.identifier());
        Ok(())
    }

    /// Add the edge `from -> to` between two nodes that are already present.
    pub fn connect(&mut self, from: &NodeIdentifier, to: &NodeIdentifier) -> Result<()> {
        for id in [from, to] {
            if !self.nodes.contains_key(id) {
                return Err(RundagError::UnknownNode(id.to_string()));
            }
        }
        self.check_edge(from, to)?;
        self.insert_edge(from, to);
        Ok(())
    }

    fn check_edge(&self, from: &NodeIdentifier, to: &NodeIdentifier) -> Result<()> {
        if from == to {
            return Err(RundagError::SelfLoop(from.to_string()));
        }
        // A brand-new endpoint has no edges yet, so only an edge between two
        // existing nodes can close a cycle.
        if self.nodes.contains_key(from) && self.nodes.contains_key(to) && self.reaches(to, from) {
            return Err(RundagError::DagCycle(format!(
                "edge '{from}' -> '{to}' would close a cycle"
            )));
        }
        Ok(())
    }

    fn insert_edge(&mut self, from: &NodeIdentifier, to: &NodeIdentifier) {
        if let Some(src) = self.nodes.get_mut(from) {
            if src.successors.contains(to) {
                return;
            }
            src.successors.push(to.clone());
        }
        if let Some(dst) = self.nodes.get_mut(to) {
            dst.predecessors.push(from.clone());
        }
        debug!(from = %from, to = %to, "edge added");
    }

    /// Whether `target` is reachable from `start` following successor edges.
    fn reaches(&self, start: &NodeIdentifier, target: &NodeIdentifier) -> bool {
        let mut stack = vec![start];
        let mut visited: HashSet<&NodeIdentifier> = HashSet::new();

        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.extend(self.successors_of(id));
        }
        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeIdentifier) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeIdentifier) -> Option<&LogicalNode> {
        self.nodes.get(id).map(|n| &n.node)
    }

    /// All nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &LogicalNode> {
        self.order.iter().filter_map(|id| self.node(id))
    }

    /// Nodes without predecessors. Callers must not rely on the order.
    pub fn root_nodes(&self) -> Vec<&LogicalNode> {
        self.nodes()
            .filter(|n| self.predecessors_of(n.identifier()).is_empty())
            .collect()
    }

    /// Nodes without successors.
    pub fn leaf_nodes(&self) -> Vec<&LogicalNode> {
        self.nodes()
            .filter(|n| self.successors_of(n.identifier()).is_empty())
            .collect()
    }

    pub fn predecessors_of(&self, id: &NodeIdentifier) -> &[NodeIdentifier] {
        self.nodes
            .get(id)
            .map(|n| n.predecessors.as_slice())
            .unwrap_or(&[])
    }

    pub fn successors_of(&self, id: &NodeIdentifier) -> &[NodeIdentifier] {
        self.nodes
            .get(id)
            .map(|n| n.successors.as_slice())
            .unwrap_or(&[])
    }

    /// Re-check the whole graph for cycles.
    pub fn validate(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }

    /// A valid topological order of all nodes.
    pub fn topological_order(&self) -> Result<Vec<NodeIdentifier>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for id in self.order.iter() {
            graph.add_node(id.name());
        }
        for id in self.order.iter() {
            for succ in self.successors_of(id) {
                graph.add_edge(id.name(), succ.name(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(NodeIdentifier::from).collect()),
            Err(cycle) => Err(RundagError::DagCycle(format!(
                "cycle detected in DAG involving node '{}'",
                cycle.node_id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> LogicalNode {
        LogicalNode::new(name, "log")
    }

    fn ids(nodes: Vec<&LogicalNode>) -> Vec<String> {
        let mut names: Vec<String> = nodes.iter().map(|n| n.identifier().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn add_edge_registers_both_endpoints() {
        let mut dag = Dag::new();
        dag.add_edge(&node("a"), &node("b")).unwrap();

        assert_eq!(dag.len(), 2);
        assert_eq!(dag.successors_of(&"a".into()), &["b".into()]);
        assert_eq!(dag.predecessors_of(&"b".into()), &["a".into()]);
        assert_eq!(ids(dag.root_nodes()), vec!["a"]);
        assert_eq!(ids(dag.leaf_nodes()), vec!["b"]);
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut dag = Dag::new();
        dag.add_node(node("a"));
        dag.add_node(LogicalNode::new("a", "fail"));

        assert_eq!(dag.len(), 1);
        assert_eq!(dag.node(&"a".into()).unwrap().operator().kind, "log");
    }

    #[test]
    fn duplicate_edge_is_recorded_once() {
        let mut dag = Dag::new();
        dag.add_edge(&node("a"), &node("b")).unwrap();
        dag.add_edge(&node("a"), &node("b")).unwrap();

        assert_eq!(dag.successors_of(&"a".into()).len(), 1);
        assert_eq!(dag.predecessors_of(&"b".into()).len(), 1);
    }

    #[test]
    fn cycle_is_rejected_and_graph_unchanged() {
        let mut dag = Dag::new();
        dag.add_edge(&node("a"), &node("b")).unwrap();
        dag.add_edge(&node("b"), &node("c")).unwrap();

        let err = dag.add_edge(&node("c"), &node("a")).unwrap_err();
        assert!(matches!(err, RundagError::DagCycle(_)));
        assert!(dag.successors_of(&"c".into()).is_empty());
        assert!(dag.validate().is_ok());
    }

    #[test]
    fn self_loop_is_rejected_before_registration() {
        let mut dag = Dag::new();
        let err = dag.add_edge(&node("a"), &node("a")).unwrap_err();
        assert!(matches!(err, RundagError::SelfLoop(_)));
        assert!(dag.is_empty());
    }

    #[test]
    fn connect_requires_existing_nodes() {
        let mut dag = Dag::new();
        dag.add_node(node("a"));
        let err = dag.connect(&"a".into(), &"missing".into()).unwrap_err();
        assert!(matches!(err, RundagError::UnknownNode(name) if name == "missing"));
    }

    #[test]
    fn topological_order_respects_edges() {
        let mut dag = Dag::new();
        dag.add_edge(&node("root"), &node("22")).unwrap();
        dag.add_edge(&node("22"), &node("23")).unwrap();
        dag.add_edge(&node("22"), &node("24")).unwrap();
        dag.add_edge(&node("23"), &node("leaf")).unwrap();
        dag.add_edge(&node("24"), &node("leaf")).unwrap();

        let order = dag.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|id| id.name() == name).unwrap();
        assert!(pos("root") < pos("22"));
        assert!(pos("22") < pos("23"));
        assert!(pos("22") < pos("24"));
        assert!(pos("23") < pos("leaf"));
        assert!(pos("24") < pos("leaf"));
    }
}
