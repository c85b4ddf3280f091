#![allow(dead_code)]

use std::collections::BTreeMap;

use rundag::config::{ConfigFile, ConfigSection, NodeSection, RawConfigFile};
use rundag::dag::{Dag, LogicalNode, NodeConfig};
use serde_json::Value;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, name: &str, node: NodeSection) -> Self {
        self.config.node.insert(name.to_string(), node);
        self
    }

    pub fn stop_at_failure(mut self, val: bool) -> Self {
        self.config.config.stop_at_failure = val;
        self
    }

    pub fn max_parallelism(mut self, n: usize) -> Self {
        self.config.config.max_parallelism = Some(n);
        self
    }

    /// The raw, unvalidated config.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeSection`.
pub struct NodeSectionBuilder {
    node: NodeSection,
}

impl NodeSectionBuilder {
    pub fn new(operator: &str) -> Self {
        Self {
            node: NodeSection {
                operator: operator.to_string(),
                after: vec![],
                skip_at_failure: false,
                params: Value::Null,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.after.push(dep.to_string());
        self
    }

    pub fn skip_at_failure(mut self, val: bool) -> Self {
        self.node.skip_at_failure = val;
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.node.params = params;
        self
    }

    pub fn build(self) -> NodeSection {
        self.node
    }
}

/// Builder for an in-memory `Dag`, addressing nodes by name.
///
/// Nodes default to the `log` operator; `node_with` picks another kind.
#[derive(Default)]
pub struct DagBuilder {
    dag: Dag,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(self, name: &str) -> Self {
        self.node_with(name, "log")
    }

    pub fn node_with(mut self, name: &str, kind: &str) -> Self {
        self.dag.add_node(LogicalNode::new(name, kind));
        self
    }

    /// Node whose own failure is tolerated by its successors.
    pub fn skipping_node(mut self, name: &str, kind: &str) -> Self {
        self.dag.add_node(
            LogicalNode::new(name, kind).with_config(NodeConfig::default().skip_at_failure(true)),
        );
        self
    }

    pub fn node_with_params(mut self, name: &str, kind: &str, params: Value) -> Self {
        self.dag.add_node(LogicalNode::new(name, kind).with_params(params));
        self
    }

    /// `from -> to`; missing endpoints are added as `log` nodes.
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        for name in [from, to] {
            if !self.dag.contains(&name.into()) {
                self.dag.add_node(LogicalNode::new(name, "log"));
            }
        }
        self.dag
            .connect(&from.into(), &to.into())
            .expect("edge should keep the graph acyclic");
        self
    }

    /// `a -> b -> c -> ...`
    pub fn chain(mut self, names: &[&str]) -> Self {
        for pair in names.windows(2) {
            self = self.edge(pair[0], pair[1]);
        }
        self
    }

    pub fn build(self) -> Dag {
        self.dag
    }
}
